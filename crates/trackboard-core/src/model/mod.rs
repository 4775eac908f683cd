pub mod seed;
pub mod task;

pub use task::{Category, NewTask, Priority, Status, Task, TaskPatch};

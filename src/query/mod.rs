pub mod builder;
pub mod engine;
pub mod window;

pub use builder::{SortKey, SortOrder, TaskQuery};
pub use engine::{list_tasks, ListTasksParams};
pub use window::RollingWindow;

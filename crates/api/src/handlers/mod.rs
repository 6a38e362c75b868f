pub mod health;
pub mod task_events;
pub mod task_instances;
pub mod workflows;
pub mod workers;

pub mod organization;
pub mod task;
pub mod user;

pub use organization::Organization;
pub use task::Task;
pub use user::User;

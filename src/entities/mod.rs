pub mod prelude;

pub mod designations;
pub mod designations_history;
pub mod password_history;
pub mod users;
pub mod users_history;

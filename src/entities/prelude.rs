pub use super::designations::Entity as Designations;
pub use super::designations_history::Entity as DesignationsHistory;
pub use super::password_history::Entity as PasswordHistory;
pub use super::users::Entity as Users;
pub use super::users_history::Entity as UsersHistory;

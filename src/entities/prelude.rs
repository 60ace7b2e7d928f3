pub use super::employees::Entity as Employees;
pub use super::password_history::Entity as PasswordHistory;
pub use super::password_settings::Entity as PasswordSettings;
pub use super::user_employee_links::Entity as UserEmployeeLinks;
pub use super::users::Entity as Users;

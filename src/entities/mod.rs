pub mod prelude;

pub mod employees;
pub mod password_history;
pub mod password_settings;
pub mod user_employee_links;
pub mod users;

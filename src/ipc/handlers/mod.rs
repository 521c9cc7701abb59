pub mod accounts;
pub mod classes;
pub mod core;
pub mod dashboard;
pub mod notices;
pub mod scheme;
pub mod session;
pub mod students;
pub mod teachers;

pub mod operator;
pub mod readiness;
pub mod reporter;

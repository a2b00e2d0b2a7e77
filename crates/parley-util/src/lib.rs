pub mod snowflake;
pub mod validation;
pub mod wire_id;

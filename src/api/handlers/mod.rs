pub mod health;
pub mod records;
pub mod temp_objects;

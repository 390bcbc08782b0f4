pub mod month;

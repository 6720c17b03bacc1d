pub mod stream;
pub mod unary;

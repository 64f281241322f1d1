pub mod jose;
pub mod keyset;
pub mod state;

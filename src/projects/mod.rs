pub mod broadcast;
pub mod crud;

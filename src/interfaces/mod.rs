pub mod callback;
pub mod curl;

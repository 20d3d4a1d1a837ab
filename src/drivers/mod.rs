mod in_memory_test;
mod tokio_postgres;

pub use self::in_memory_test::{
    InMemoryResponse, InMemoryTestDriver, InMemoryTestResponseBuilder, RecordedCall,
};
pub use self::tokio_postgres::TokioPostgresDriver;

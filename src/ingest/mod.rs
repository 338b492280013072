mod service;

pub use service::{IngestOutcome, IngestionService, ReadingSubmission, SensorValue};

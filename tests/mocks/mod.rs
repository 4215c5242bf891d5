pub mod mock_notifier;
pub mod mock_source;
pub mod test_data_generator;

pub use mock_notifier::RecordingNotifier;
pub use mock_predictor::ScriptedPredictor;
pub use mock_source::{ScriptStep, ScriptedSource};
pub use test_data_generator::SnapshotGenerator;

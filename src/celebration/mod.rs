// Celebration pipeline: FIFO queue of detected sales and the timed
// audiovisual sequence that presents them one at a time.

pub mod audio;
pub mod queue;
pub mod sequencer;

pub use audio::{AudioError, AudioPlayer, NullAudioPlayer};
pub use queue::CelebrationQueue;
pub use sequencer::{run_engine, CelebrationSequencer};

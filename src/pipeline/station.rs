//! Station abstraction: a stage that owns a thread and processes work items
//! from a channel, one at a time, in order.

use crate::pipeline::error::{ErrorReporter, StageError};
use crossbeam_channel::{Receiver, Sender};
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A processing station.
pub trait Station: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Processes a single input item.
    ///
    /// Returns:
    /// - `Ok(Some(output))` - Processed and produced output
    /// - `Ok(None)` - Processed, nothing to forward
    /// - `Err(StageError)` - Processing failed
    fn process(&mut self, input: Self::Input) -> Result<Option<Self::Output>, StageError>;

    /// Name used in logs and error reports.
    fn name(&self) -> &'static str;

    /// Called once when the input channel closes or a fatal error occurs.
    fn shutdown(&mut self) {}
}

/// Runs a station in a dedicated thread.
pub struct StationRunner<S: Station> {
    handle: Option<JoinHandle<()>>,
    station_name: &'static str,
    _phantom: PhantomData<S>,
}

impl<S: Station> StationRunner<S> {
    /// Spawns `station` reading from `input_rx` and forwarding to `output_tx`.
    pub fn spawn(
        mut station: S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let station_name = station.name();

        let handle = thread::Builder::new()
            .name(format!("voxbot-{}", station_name))
            .spawn(move || {
                Self::run_station(&mut station, input_rx, output_tx, error_reporter);
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(station = station_name, error = %e, "failed to spawn station thread");
                None
            }
        };

        Self {
            handle,
            station_name,
            _phantom: PhantomData,
        }
    }

    fn run_station(
        station: &mut S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) {
        let station_name = station.name();
        tracing::debug!(station = station_name, "station started");

        while let Ok(input) = input_rx.recv() {
            match station.process(input) {
                Ok(Some(output)) => {
                    if output_tx.send(output).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(error @ StageError::Recoverable(_)) => {
                    error_reporter.report(station_name, &error);
                }
                Err(error @ StageError::Fatal(_)) => {
                    error_reporter.report(station_name, &error);
                    break;
                }
            }
        }

        station.shutdown();
        tracing::debug!(station = station_name, "station stopped");
    }

    /// Waits for the station thread to complete.
    pub fn join(mut self) -> Result<(), String> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| format!("Station '{}' thread panicked", self.station_name)),
            None => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.station_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Upper {
        shutdown_called: Arc<AtomicBool>,
    }

    impl Station for Upper {
        type Input = String;
        type Output = String;

        fn process(&mut self, input: String) -> Result<Option<String>, StageError> {
            match input.as_str() {
                "" => Ok(None),
                "bad" => Err(StageError::Recoverable("bad input".to_string())),
                "fatal" => Err(StageError::Fatal("cannot continue".to_string())),
                _ => Ok(Some(input.to_uppercase())),
            }
        }

        fn name(&self) -> &'static str {
            "Upper"
        }

        fn shutdown(&mut self) {
            self.shutdown_called.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockReporter {
        errors: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl ErrorReporter for MockReporter {
        fn report(&self, stage: &str, error: &StageError) {
            self.errors
                .lock()
                .unwrap()
                .push((stage.to_string(), error.to_string()));
        }
    }

    fn run(inputs: &[&str]) -> (Vec<String>, Vec<(String, String)>, bool) {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();
        let shutdown = Arc::new(AtomicBool::new(false));

        let runner = StationRunner::spawn(
            Upper {
                shutdown_called: shutdown.clone(),
            },
            input_rx,
            output_tx,
            reporter,
        );
        assert_eq!(runner.name(), "Upper");

        for input in inputs {
            input_tx.send(input.to_string()).unwrap();
        }
        drop(input_tx);

        let outputs: Vec<String> = output_rx.iter().collect();
        runner.join().unwrap();
        let errors = errors.lock().unwrap().clone();
        (outputs, errors, shutdown.load(Ordering::SeqCst))
    }

    #[test]
    fn processes_in_order_and_shuts_down() {
        let (outputs, errors, shutdown) = run(&["a", "b", "c"]);
        assert_eq!(outputs, vec!["A", "B", "C"]);
        assert!(errors.is_empty());
        assert!(shutdown);
    }

    #[test]
    fn filtered_inputs_produce_nothing() {
        let (outputs, _, _) = run(&["a", "", "b"]);
        assert_eq!(outputs, vec!["A", "B"]);
    }

    #[test]
    fn recoverable_errors_are_reported_and_skipped() {
        let (outputs, errors, _) = run(&["a", "bad", "b", "bad"]);
        assert_eq!(outputs, vec!["A", "B"]);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].0, "Upper");
        assert!(errors[0].1.contains("bad input"));
    }

    #[test]
    fn fatal_error_stops_station() {
        let (outputs, errors, shutdown) = run(&["a", "fatal", "b"]);
        assert_eq!(outputs, vec!["A"]);
        assert_eq!(errors.len(), 1);
        assert!(shutdown);
    }

    #[test]
    fn closed_output_channel_stops_station() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded::<String>(10);
        let shutdown = Arc::new(AtomicBool::new(false));
        let runner = StationRunner::spawn(
            Upper {
                shutdown_called: shutdown.clone(),
            },
            input_rx,
            output_tx,
            Arc::new(MockReporter::default()),
        );
        drop(output_rx);
        input_tx.send("a".to_string()).unwrap();
        runner.join().unwrap();
        assert!(shutdown.load(Ordering::SeqCst));
    }
}

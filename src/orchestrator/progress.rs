// tablevault/src/orchestrator/progress.rs
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io;
use tracing_subscriber::fmt::MakeWriter;

use super::task::Outcome;

/// Receives a notification every time the orchestrator records an outcome.
///
/// `completed` increases by exactly one per call.
pub trait ProgressObserver: Send + Sync {
    fn on_start(&self, _total: usize) {}

    fn on_outcome(&self, completed: usize, total: usize, outcome: &Outcome);

    fn on_finish(&self) {}
}

pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_outcome(&self, _completed: usize, _total: usize, _outcome: &Outcome) {}
}

/// Terminal progress bar, one tick per finished table.
///
/// The bar joins `multi` only once the run starts, so nothing is drawn while
/// tables are still being listed.
pub struct ProgressBarObserver {
    multi: MultiProgress,
    bar: ProgressBar,
}

impl ProgressBarObserver {
    pub fn new(multi: &MultiProgress, label: &str) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template(
                "{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tables {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        bar.set_prefix(label.to_string());
        Self {
            multi: multi.clone(),
            bar,
        }
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.multi.add(self.bar.clone());
    }

    fn on_outcome(&self, completed: usize, _total: usize, outcome: &Outcome) {
        self.bar.set_position(completed as u64);
        self.bar.set_message(outcome.id().to_string());
    }

    fn on_finish(&self) {
        self.bar.finish_with_message("done");
    }
}

/// Log writer that clears the progress bars around every write, so log
/// lines never land in the middle of a bar.
#[derive(Clone)]
pub struct ProgressLogWriter<M> {
    multi: MultiProgress,
    inner: M,
}

impl<M> ProgressLogWriter<M> {
    pub fn new(multi: MultiProgress, inner: M) -> Self {
        Self { multi, inner }
    }
}

pub struct SuspendedWrite<W> {
    multi: MultiProgress,
    inner: W,
}

impl<W: io::Write> io::Write for SuspendedWrite<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = &mut self.inner;
        self.multi.suspend(|| inner.write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let inner = &mut self.inner;
        self.multi.suspend(|| inner.write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<'a, M> MakeWriter<'a> for ProgressLogWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SuspendedWrite<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendedWrite {
            multi: self.multi.clone(),
            inner: self.inner.make_writer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_logs_pass_through_while_bar_is_active() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let observer = ProgressBarObserver::new(&multi, "backup");
        observer.on_start(3);
        observer.on_outcome(1, 3, &Outcome::failed("orders", "Access denied"));

        let buf = SharedBuf::default();
        let sink = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(ProgressLogWriter::new(multi.clone(), move || sink.clone()))
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(table = "orders", "dump failed");
        });

        let logged = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("dump failed"));
        assert!(logged.contains("orders"));
        assert_eq!(observer.bar.position(), 1);
        observer.on_finish();
        assert!(observer.bar.is_finished());
    }
}

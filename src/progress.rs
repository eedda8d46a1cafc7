//! Progress reporting: an ambient concern layered over C1/C3's raw byte
//! counters, not named as its own spec component but required by the `-p`
//! flag and the `*-with-progress`/`*-with-gauge`/`*-with-xgauge` command
//! variants in the CLI grammar.

use std::io::Write;

/// Receives byte-count updates for a single transfer of known total length.
pub trait ProgressSink {
    fn start(&mut self, total: usize);
    fn update(&mut self, sent: usize);
    fn finish(&mut self);
}

/// Default: no progress reporting at all.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn start(&mut self, _total: usize) {}
    fn update(&mut self, _sent: usize) {}
    fn finish(&mut self) {}
}

/// `-p`/`--progress` and the `write-with-progress` family: an indicatif bar.
pub struct BarProgress {
    bar: indicatif::ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            bar: indicatif::ProgressBar::hidden(),
        }
    }
}

impl ProgressSink for BarProgress {
    fn start(&mut self, total: usize) {
        self.bar = indicatif::ProgressBar::new(total as u64);
        self.bar.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("{bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar()),
        );
    }

    fn update(&mut self, sent: usize) {
        self.bar.set_position(sent as u64);
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// `write-with-gauge`/`write-with-xgauge`/`echo-gauge`: a single line of the
/// form `PROGRESS <sent> <total>` written to stdout for a calling process
/// (e.g. a dialog/Xdialog gauge widget) to parse, one line per update.
pub struct GaugeProgress<W: Write> {
    out: W,
    total: usize,
}

impl<W: Write> GaugeProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out, total: 0 }
    }
}

impl<W: Write> ProgressSink for GaugeProgress<W> {
    fn start(&mut self, total: usize) {
        self.total = total;
    }

    fn update(&mut self, sent: usize) {
        let _ = writeln!(self.out, "PROGRESS {sent} {}", self.total);
        let _ = self.out.flush();
    }

    fn finish(&mut self) {
        let _ = writeln!(self.out, "PROGRESS {0} {0}", self.total);
    }
}

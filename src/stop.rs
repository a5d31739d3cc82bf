use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

pub const PROMPT: &str = "Type s to stop experiment $>";

// Write-once, shared by cloning
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
	posted: Arc<AtomicBool>,
}

impl StopSignal {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn post(&self) {
		self.posted.store(true, Ordering::SeqCst);
	}

	pub fn is_posted(&self) -> bool {
		self.posted.load(Ordering::SeqCst)
	}
}

pub fn is_stop_command(line: &str) -> bool {
	line.to_lowercase().contains('s')
}

// End of input ends the monitor without posting
pub fn spawn_monitor<R, W>(signal: StopSignal, mut input: R, mut prompt: W, delay: Duration) -> JoinHandle<()>
where
	R: BufRead + Send + 'static,
	W: Write + Send + 'static,
{
	thread::spawn(move || {
		thread::sleep(delay);

		let mut line = String::new();
		loop {
			if write!(prompt, "{}", PROMPT).and_then(|_| prompt.flush()).is_err() {
				debug!("Stop prompt could not be written");
			}

			line.clear();
			match input.read_line(&mut line) {
				Ok(0) => {
					debug!("Stop monitor input closed");
					return;
				}
				Ok(_) if is_stop_command(&line) => break,
				Ok(_) => continue,
				Err(e) => {
					warn!("Stop monitor could not read input: {}", e);
					return;
				}
			}
		}

		signal.post();
		info!("STOPPING EXPERIMENT");
	})
}

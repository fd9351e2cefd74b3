//! Process-wide ring buffer of recent device I/O.
//!
//! Interface errors attach the tail of this buffer so that a failed session
//! can be diagnosed without re-running it with tracing enabled.

use std::collections::VecDeque;
use std::sync::Mutex;

const MAX_LINES: usize = 50;

static LOG: Mutex<VecDeque<String>> = Mutex::new(VecDeque::new());

fn push(line: String) {
    let mut log = LOG.lock().expect("io log lock poisoned");
    if log.len() == MAX_LINES {
        log.pop_front();
    }
    log.push_back(line);
}

/// Record bytes written to the device.
pub fn log_write(data: &[u8]) {
    let printable: String = data
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { char::from(b) } else { '.' })
        .collect();
    push(format!(">> {printable}"));
}

/// Record a line read from the device.
pub fn log_read(line: &str) {
    push(format!("<< {line}"));
}

/// The most recent I/O lines, oldest first.
pub fn tail() -> Vec<String> {
    LOG.lock().expect("io log lock poisoned").iter().cloned().collect()
}

/// Clear the buffer. Used between sessions and by tests.
pub fn clear() {
    LOG.lock().expect("io log lock poisoned").clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_caps_at_50() {
        // note: other tests may log concurrently, so only the invariants
        // are checked, not the exact contents
        for i in 0..60 {
            log_read(&format!("ring test {i}"));
        }

        let tail = tail();
        assert_eq!(tail.len(), 50);
        assert!(tail.iter().any(|l| l == "<< ring test 59"));
        assert!(!tail.iter().any(|l| l == "<< ring test 0"));
    }
}

use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::time::Instant;

use crate::blockchain::BlockHeader;
use crate::blockchain::block::meets_difficulty;

/// Refresh the elapsed-time counter every this many hashes.
const ELAPSED_REFRESH_MASK: u64 = 0x3ff;

/// Live counters one worker publishes for status queries. Readers never block the worker.
#[derive(Debug, Default)]
pub struct SearchProgress {
    nonce: AtomicU64,
    elapsed_ms: AtomicU64,
    finished: AtomicBool,
}

impl SearchProgress {
    pub fn nonce(&self) -> u64 {
        self.nonce.load(Ordering::Relaxed)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// A valid nonce reported by the worker for `participant`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub participant: usize,
    pub nonce: u64,
    pub hash: String,
    pub elapsed_ms: u64,
}

pub struct SearchJob {
    pub participant: usize,
    pub header: BlockHeader,
    pub cancel: Arc<AtomicBool>,
    pub progress: Arc<SearchProgress>,
    pub results: Sender<Finding>,
}

/// Hash nonces from zero until one meets the header's difficulty or the
/// round is cancelled. The cancel flag is read after every hash, so a
/// cancelled worker stops within one iteration.
pub fn run_search(job: SearchJob) {
    let SearchJob {
        participant,
        header,
        cancel,
        progress,
        results,
    } = job;

    let hasher = header.hasher();
    let started = Instant::now();
    let mut nonce: u64 = 0;

    loop {
        let hash = hasher.hash(nonce);
        progress.nonce.store(nonce, Ordering::Relaxed);

        if meets_difficulty(&hash, header.difficulty) {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            progress.elapsed_ms.store(elapsed_ms, Ordering::Relaxed);
            debug!("SEARCH - participant {participant} found nonce {nonce} after {elapsed_ms}ms");
            // The collector may already be gone after a reset.
            let _ = results.send(Finding {
                participant,
                nonce,
                hash,
                elapsed_ms,
            });
            break;
        }

        if cancel.load(Ordering::Acquire) {
            debug!("SEARCH - participant {participant} cancelled at nonce {nonce}");
            break;
        }

        if nonce & ELAPSED_REFRESH_MASK == 0 {
            progress
                .elapsed_ms
                .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
        }
        nonce = nonce.wrapping_add(1);
    }

    progress
        .elapsed_ms
        .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
    progress.finished.store(true, Ordering::Release);
}

/// Among findings that arrived before every worker stopped, the participant
/// registered first wins.
pub fn resolve_winner(findings: &[Finding]) -> Option<&Finding> {
    findings.iter().min_by_key(|f| f.participant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn header(difficulty: u32) -> BlockHeader {
        BlockHeader::new(1, "prev".into(), &[], difficulty, 1_700_000_000)
    }

    fn finding(participant: usize, nonce: u64) -> Finding {
        Finding {
            participant,
            nonce,
            hash: String::new(),
            elapsed_ms: 0,
        }
    }

    #[test]
    fn earliest_registered_participant_wins_ties() {
        let arrivals = vec![finding(2, 10), finding(0, 99), finding(1, 3)];
        assert_eq!(resolve_winner(&arrivals).unwrap().participant, 0);

        let reversed: Vec<_> = arrivals.into_iter().rev().collect();
        assert_eq!(resolve_winner(&reversed).unwrap().participant, 0);
        assert!(resolve_winner(&[]).is_none());
    }

    #[test]
    fn search_reports_a_valid_nonce() {
        let (tx, rx) = mpsc::channel();
        let progress = Arc::new(SearchProgress::default());
        let h = header(1);
        run_search(SearchJob {
            participant: 4,
            header: h.clone(),
            cancel: Arc::new(AtomicBool::new(false)),
            progress: Arc::clone(&progress),
            results: tx,
        });

        let found = rx.recv().unwrap();
        assert_eq!(found.participant, 4);
        assert_eq!(found.hash, h.hash_with_nonce(found.nonce));
        assert!(found.hash.starts_with('0'));
        assert_eq!(progress.nonce(), found.nonce);
        assert!(progress.is_finished());
    }

    #[test]
    fn zero_difficulty_wins_at_first_nonce() {
        let (tx, rx) = mpsc::channel();
        run_search(SearchJob {
            participant: 0,
            header: header(0),
            cancel: Arc::new(AtomicBool::new(true)),
            progress: Arc::new(SearchProgress::default()),
            results: tx,
        });
        assert_eq!(rx.recv().unwrap().nonce, 0);
    }

    #[test]
    fn cancelled_search_stops_without_reporting() {
        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let progress = Arc::new(SearchProgress::default());
        let job = SearchJob {
            participant: 0,
            header: header(64),
            cancel: Arc::clone(&cancel),
            progress: Arc::clone(&progress),
            results: tx,
        };
        let worker = thread::spawn(move || run_search(job));

        thread::sleep(Duration::from_millis(20));
        cancel.store(true, Ordering::Release);
        worker.join().unwrap();

        assert!(progress.is_finished());
        assert!(progress.nonce() > 0);
        assert!(rx.try_recv().is_err());
    }
}

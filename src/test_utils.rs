//! A scripted counter source for tests.

use crate::core::{
    CounterSource, CpuCounters, DiskCounters, MemoryCounters, ProcessCounters, SourceError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Queue<T> = Arc<Mutex<VecDeque<Result<T, String>>>>;

/// Fake counter source for testing.
///
/// Each read pops the next scripted response for its domain. Once a queue is
/// exhausted the last successful response is repeated, or an error is
/// returned when there never was one.
#[derive(Default, Clone)]
pub struct FakeSource {
    cpu: Queue<CpuCounters>,
    memory: Queue<MemoryCounters>,
    processes: Queue<Vec<ProcessCounters>>,
    disks: Queue<DiskCounters>,
    last_cpu: Arc<Mutex<Option<CpuCounters>>>,
    last_memory: Arc<Mutex<Option<MemoryCounters>>>,
    last_processes: Arc<Mutex<Option<Vec<ProcessCounters>>>>,
    last_disks: Arc<Mutex<Option<DiskCounters>>>,
    read_delay: Arc<Mutex<Option<Duration>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every read block for `delay` before answering.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    /// The most reads that were ever running at the same time.
    pub fn max_concurrent_reads(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn push_cpu(&self, response: Result<CpuCounters, &str>) {
        self.cpu.lock().unwrap().push_back(response.map_err(str::to_string));
    }

    pub fn push_memory(&self, response: Result<MemoryCounters, &str>) {
        self.memory.lock().unwrap().push_back(response.map_err(str::to_string));
    }

    pub fn push_processes(&self, response: Result<Vec<ProcessCounters>, &str>) {
        self.processes
            .lock()
            .unwrap()
            .push_back(response.map_err(str::to_string));
    }

    pub fn push_disks(&self, response: Result<DiskCounters, &str>) {
        self.disks.lock().unwrap().push_back(response.map_err(str::to_string));
    }

    fn next<T: Clone>(
        &self,
        path: &str,
        queue: &Queue<T>,
        last: &Arc<Mutex<Option<T>>>,
    ) -> Result<T, SourceError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let result = self.pop(path, queue, last);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn pop<T: Clone>(
        &self,
        path: &str,
        queue: &Queue<T>,
        last: &Arc<Mutex<Option<T>>>,
    ) -> Result<T, SourceError> {
        let next = queue.lock().unwrap().pop_front();
        match next {
            Some(Ok(value)) => {
                *last.lock().unwrap() = Some(value.clone());
                Ok(value)
            }
            Some(Err(reason)) => Err(SourceError::Parse {
                path: path.to_string(),
                reason,
            }),
            None => last.lock().unwrap().clone().ok_or_else(|| SourceError::Parse {
                path: path.to_string(),
                reason: "no more responses configured".to_string(),
            }),
        }
    }
}

impl CounterSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    fn read_cpu(&self) -> Result<CpuCounters, SourceError> {
        self.next("fake/cpu", &self.cpu, &self.last_cpu)
    }

    fn read_memory(&self) -> Result<MemoryCounters, SourceError> {
        self.next("fake/memory", &self.memory, &self.last_memory)
    }

    fn list_processes(&self) -> Result<Vec<ProcessCounters>, SourceError> {
        self.next("fake/processes", &self.processes, &self.last_processes)
    }

    fn read_disks(&self) -> Result<DiskCounters, SourceError> {
        self.next("fake/disks", &self.disks, &self.last_disks)
    }
}

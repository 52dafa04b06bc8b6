//! Sample Queue
//!
//! Lock-free SPSC hand-off between a push-style producer (audio callback,
//! ADC interrupt) and the block-oriented frame loop.
//!
//! ## Audio Thread Safety
//! - Ring allocated in `sample_queue()`
//! - `SampleWriter::push()` never blocks or allocates; on overflow the excess
//!   is dropped and counted
//! - `SampleReader::read_block()` only ever hands out whole blocks

use ringbuf::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Create a queue holding up to `capacity` samples.
pub fn sample_queue(capacity: usize) -> (SampleWriter, SampleReader) {
    let (producer, consumer) = RingBuffer::<f32>::new(capacity.max(1)).split();
    let dropped = Arc::new(AtomicUsize::new(0));
    (
        SampleWriter {
            producer,
            dropped: Arc::clone(&dropped),
        },
        SampleReader { consumer, dropped },
    )
}

pub struct SampleWriter {
    producer: Producer<f32>,
    dropped: Arc<AtomicUsize>,
}

impl SampleWriter {
    /// Queue as many samples as fit. Returns the number written.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let written = self.producer.push_slice(samples);
        let lost = samples.len() - written;
        if lost > 0 {
            self.dropped.fetch_add(lost, Ordering::Relaxed);
        }
        written
    }

    pub fn push_sample(&mut self, x: f32) -> bool {
        match self.producer.push(x) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

pub struct SampleReader {
    consumer: Consumer<f32>,
    dropped: Arc<AtomicUsize>,
}

impl SampleReader {
    /// Samples waiting.
    pub fn available(&self) -> usize {
        self.consumer.len()
    }

    /// Fill `block` if a whole block is waiting; otherwise leave the queue alone.
    pub fn read_block(&mut self, block: &mut [f32]) -> bool {
        if self.consumer.len() < block.len() {
            return false;
        }
        let n = self.consumer.pop_slice(block);
        debug_assert_eq!(n, block.len());
        true
    }

    /// Samples lost to overflow since creation.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_blocks_only() {
        let (mut w, mut r) = sample_queue(16);
        w.push(&[1.0, 2.0, 3.0]);
        let mut block = [0.0; 4];
        assert!(!r.read_block(&mut block));
        assert_eq!(r.available(), 3);

        w.push(&[4.0]);
        assert!(r.read_block(&mut block));
        assert_eq!(block, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(r.available(), 0);
    }

    #[test]
    fn test_overflow_is_counted() {
        let (mut w, r) = sample_queue(4);
        assert_eq!(w.push(&[0.0; 6]), 4);
        assert!(!w.push_sample(1.0));
        assert_eq!(r.dropped(), 3);
    }

    #[test]
    fn test_works_across_threads() {
        let (mut w, mut r) = sample_queue(1024);
        let producer = std::thread::spawn(move || {
            for k in 0..256 {
                w.push_sample(k as f32);
            }
        });
        producer.join().unwrap();
        let mut block = [0.0; 256];
        assert!(r.read_block(&mut block));
        assert_eq!(block[255], 255.0);
    }
}

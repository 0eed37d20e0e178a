/// Integration tests for the audio buffer
///
/// Covers length accounting, clear semantics and the single-producer /
/// single-consumer hand-off across threads.

use std::thread;

use proptest::prelude::*;
use soundport::audio::{AudioBuffer, BufferLayout};

#[test]
fn test_push_then_clear() {
    let buffer = AudioBuffer::with_capacity(1024);

    buffer.push(&[0.1, 0.2, 0.3]);
    println!("\n=== Buffer Accounting ===");
    println!("After push: length = {}", buffer.length());
    assert_eq!(buffer.length(), 3);

    buffer.clear().unwrap();
    println!("After clear: length = {}", buffer.length());
    assert_eq!(buffer.length(), 0);
}

#[test]
fn test_default_capacity_from_config() {
    let buffer = AudioBuffer::new();
    let configured = soundport::state::config::current().buffer.capacity;

    println!("\nDefault buffer capacity: {} samples", buffer.capacity());
    assert_eq!(buffer.capacity(), configured);
    assert_eq!(buffer.layout(), BufferLayout::Interleaved);
}

#[test]
fn test_cross_thread_transfer() {
    let buffer = AudioBuffer::with_capacity(512);
    let total = 48_000usize;

    let producer = {
        let buffer = buffer.clone();
        thread::spawn(move || {
            let mut next = 0usize;
            while next < total {
                let end = (next + 128).min(total);
                let chunk: Vec<f32> = (next..end).map(|i| i as f32).collect();
                let written = buffer.push(&chunk);
                next += written;
                if written == 0 {
                    thread::yield_now();
                }
            }
        })
    };

    let mut received = Vec::with_capacity(total);
    let mut scratch = [0.0f32; 256];
    while received.len() < total {
        let read = buffer.pop(&mut scratch);
        received.extend_from_slice(&scratch[..read]);
        if read == 0 {
            thread::yield_now();
        }
    }
    producer.join().unwrap();

    println!("\nTransferred {} samples across threads", received.len());
    assert!(received.iter().enumerate().all(|(i, s)| *s == i as f32));
    assert!(buffer.is_empty());
}

proptest! {
    #[test]
    fn length_is_sum_of_pushes(
        first in proptest::collection::vec(-1.0f32..1.0, 0..200),
        second in proptest::collection::vec(-1.0f32..1.0, 0..200),
    ) {
        let buffer = AudioBuffer::with_capacity(400);
        buffer.push(&first);
        buffer.push(&second);
        prop_assert_eq!(buffer.length(), first.len() + second.len());

        let mut expected = first.clone();
        expected.extend_from_slice(&second);
        prop_assert_eq!(buffer.drain(), expected);
    }

    #[test]
    fn push_never_exceeds_capacity(capacity in 1usize..256, len in 0usize..512) {
        let buffer = AudioBuffer::with_capacity(capacity);
        let accepted = buffer.push(&vec![0.5; len]);
        prop_assert_eq!(accepted, len.min(capacity));
        prop_assert_eq!(buffer.length() + buffer.vacant(), capacity);
    }
}

//! Dispatcher ordering, backpressure and callback fan-out under concurrent
//! producers.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use edgelink::config::ClientConfig;
use edgelink::error::Error;
use edgelink::messaging::message::{Message, Priority};

use super::support::{Harness, WAIT};

fn tagged(tag: String, priority: Priority) -> Message {
    Message::data(tag, "urn:test:fmt", Vec::new()).with_priority(priority)
}

#[test]
fn priority_lanes_drain_highest_first() {
    let mut h = Harness::paused(ClientConfig::default());
    for (tag, p) in [
        ("LOW-1", Priority::Low),
        ("HIGH", Priority::High),
        ("LOW-2", Priority::Low),
        ("HIGHEST", Priority::Highest),
        ("MEDIUM", Priority::Medium),
    ] {
        h.dispatcher.queue(tagged(tag.into(), p)).unwrap();
    }
    let order: Vec<String> = h.drain().into_iter().map(|m| m.base.source).collect();
    assert_eq!(order, vec!["HIGHEST", "HIGH", "MEDIUM", "LOW-1", "LOW-2"]);
}

#[test]
fn concurrent_producers_keep_per_producer_order() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 25;

    let mut h = Harness::paused(ClientConfig {
        queue_capacity: PRODUCERS * PER_PRODUCER,
        ..ClientConfig::default()
    });
    h.dispatcher.start().unwrap();

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = h.dispatcher.handle();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    queue
                        .queue(tagged(format!("{p}:{seq}"), Priority::Medium))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let sent = h.drain();
    assert_eq!(sent.len(), PRODUCERS * PER_PRODUCER);
    for p in 0..PRODUCERS {
        let seqs: Vec<usize> = sent
            .iter()
            .filter_map(|m| {
                let (producer, seq) = m.base.source.split_once(':')?;
                (producer == p.to_string()).then(|| seq.parse().unwrap())
            })
            .collect();
        assert_eq!(seqs, (0..PER_PRODUCER).collect::<Vec<_>>(), "producer {p}");
    }
}

#[test]
fn every_message_gets_exactly_one_callback() {
    let mut h = Harness::paused(ClientConfig {
        max_messages_for_send: 3,
        ..ClientConfig::default()
    });
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let failed = Arc::new(Mutex::new(Vec::new()));
    {
        let delivered = Arc::clone(&delivered);
        h.dispatcher
            .set_delivery_callback(move |m| delivered.lock().push(m.base.source.clone()));
        let failed = Arc::clone(&failed);
        h.dispatcher
            .set_error_callback(move |m, e, _| failed.lock().push((m.base.source.clone(), e)));
    }

    // First batch (3 messages) fails, the rest succeed.
    h.transport.fail_next_batch(Error::Fail, "connection reset");
    for i in 0..7 {
        h.dispatcher
            .queue(tagged(format!("m{i}"), Priority::Low))
            .unwrap();
    }
    h.drain();

    assert_eq!(h.transport.batch_sizes(), vec![3, 3, 1]);
    assert_eq!(
        *failed.lock(),
        vec![
            ("m0".to_owned(), Error::Fail),
            ("m1".to_owned(), Error::Fail),
            ("m2".to_owned(), Error::Fail),
        ]
    );
    assert_eq!(*delivered.lock(), vec!["m3", "m4", "m5", "m6"]);
}

#[test]
fn last_installed_callback_wins() {
    let mut h = Harness::paused(ClientConfig::default());
    let hits = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::clone(&hits);
    h.dispatcher.set_delivery_callback(move |_| first.lock().push("first"));
    let second = Arc::clone(&hits);
    h.dispatcher.set_delivery_callback(move |_| second.lock().push("second"));

    h.dispatcher
        .queue(tagged("x".into(), Priority::Low))
        .unwrap();
    h.drain();
    assert_eq!(*hits.lock(), vec!["second"]);
}

#[test]
fn full_queue_rejects_without_blocking() {
    let h = Harness::paused(ClientConfig {
        queue_capacity: 3,
        ..ClientConfig::default()
    });
    for i in 0..3 {
        h.dispatcher
            .queue(tagged(format!("m{i}"), Priority::Low))
            .unwrap();
    }
    assert_eq!(
        h.dispatcher.queue(tagged("overflow".into(), Priority::Highest)),
        Err(Error::OutOfMemory)
    );
    assert_eq!(h.dispatcher.queue(None::<Message>), Err(Error::InvalidArgument));
    assert_eq!(h.dispatcher.len(), 3);
}

#[test]
fn wait_idle_times_out_while_paused() {
    let h = Harness::paused(ClientConfig::default());
    h.dispatcher
        .queue(tagged("stuck".into(), Priority::Low))
        .unwrap();
    assert!(!h.dispatcher.wait_idle(Duration::from_millis(20)));
}

#[test]
fn shutdown_flushes_queued_messages() {
    let mut h = Harness::started();
    for i in 0..20 {
        h.dispatcher
            .queue(tagged(format!("m{i}"), Priority::Lowest))
            .unwrap();
    }
    h.dispatcher.shutdown();
    assert_eq!(h.transport.sent().len(), 20);
    assert!(h.dispatcher.wait_idle(WAIT));
    assert_eq!(
        h.dispatcher.queue(tagged("late".into(), Priority::Low)),
        Err(Error::Fail)
    );
}

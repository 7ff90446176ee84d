//! Activation Tests
//!
//! Mount/unmount callbacks driven by live subscribers, the deactivation
//! debounce, and listeners that write back into the graph.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use lattice_signals::{
    computed, configure, effect, is_active, on_activate, set_scheduler, signal, EngineConfig,
    ManualScheduler, Mountable, ReactiveError, TokioScheduler,
};

fn timers() -> ManualScheduler {
    let timers = ManualScheduler::new();
    set_scheduler(timers.clone());
    timers
}

fn record(node: &impl Mountable) -> Rc<RefCell<Vec<bool>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    on_activate(node, move |active| sink.borrow_mut().push(active));
    log
}

// ----------------------------------------------------------------------------
// Debounce
// ----------------------------------------------------------------------------

/// Detach and re-attach inside the window: no calls. Detach for good: one
/// `false` after the window.
#[test]
fn churn_inside_the_window_is_silent() {
    let timers = timers();
    let source = signal(0);
    let show = signal(true);
    let log = record(&source);

    let (read, visible) = (source.clone(), show.clone());
    let _stop = effect(move |_| {
        if visible.get() {
            read.get();
        }
    });
    assert_eq!(*log.borrow(), vec![true]);

    for _ in 0..3 {
        show.set(false);
        timers.advance(Duration::from_millis(400));
        show.set(true);
    }
    timers.advance(Duration::from_secs(5));
    assert_eq!(*log.borrow(), vec![true]);
    assert_eq!(timers.pending(), 0);

    show.set(false);
    assert!(is_active(&source));
    timers.advance(Duration::from_millis(1000));
    assert_eq!(*log.borrow(), vec![true, false]);
    assert!(!is_active(&source));
}

/// A second subscriber keeps the node mounted while the first one leaves.
#[test]
fn overlapping_subscribers_mount_once() {
    let timers = timers();
    let source = signal(0);
    let log = record(&source);

    let read = source.clone();
    let first = effect(move |_| {
        read.get();
    });
    let read = source.clone();
    let second = effect(move |_| {
        read.get();
    });
    first.dispose();
    assert_eq!(timers.pending(), 0);

    second.dispose();
    timers.run_all();

    let read = source.clone();
    let _third = effect(move |_| {
        read.get();
    });
    assert_eq!(*log.borrow(), vec![true, false, true]);
}

/// Deactivation cascades: a computed that goes inactive lets its sources
/// start their own delay.
#[test]
fn computed_chain_unmounts_top_down() {
    let timers = timers();
    let order = Rc::new(RefCell::new(Vec::new()));
    let source = signal(1);
    let read = source.clone();
    let derived = computed(move |_| read.get() + 1);

    let sink = order.clone();
    on_activate(&source, move |active| sink.borrow_mut().push(("source", active)));
    let sink = order.clone();
    on_activate(&derived, move |active| sink.borrow_mut().push(("derived", active)));

    let read = derived.clone();
    let stop = effect(move |_| {
        read.get();
    });
    stop.dispose();

    timers.advance(Duration::from_millis(1000));
    assert_eq!(
        *order.borrow(),
        vec![("source", true), ("derived", true), ("derived", false)]
    );
    timers.advance(Duration::from_millis(1000));
    assert_eq!(order.borrow().last(), Some(&("source", false)));
    assert!(!is_active(&source));
}

// ----------------------------------------------------------------------------
// Re-entrancy
// ----------------------------------------------------------------------------

/// A listener that writes the node it is mounting: the effect that mounted
/// it sees the write.
#[test]
fn listener_writing_its_own_signal_is_observed() {
    let _timers = timers();
    let a = signal(1);
    let writer = a.clone();
    on_activate(&a, move |active| {
        if active {
            writer.set(2);
        }
    });

    let seen = Rc::new(RefCell::new(Vec::new()));
    let (read, sink) = (a.clone(), seen.clone());
    let _stop = effect(move |_| sink.borrow_mut().push(read.get()));

    assert_eq!(*seen.borrow(), vec![1, 2]);
    assert_eq!(a.get(), 2);
    assert_eq!(a.subscriber_count(), 1);
}

/// A computed's listener that writes the signal the computed reads.
#[test]
fn listener_writing_an_ancestor_signal_is_observed() {
    let _timers = timers();
    let a = signal(1);
    let read = a.clone();
    let tenfold = computed(move |_| read.get() * 10);

    let writer = a.clone();
    on_activate(&tenfold, move |active| {
        if active {
            writer.set(2);
        }
    });

    let seen = Rc::new(RefCell::new(Vec::new()));
    let (read, sink) = (tenfold.clone(), seen.clone());
    let _stop = effect(move |_| sink.borrow_mut().push(read.get()));

    assert_eq!(seen.borrow().last(), Some(&20));
    assert_eq!(seen.borrow().first(), Some(&10));
    assert_eq!(tenfold.get(), 20);

    a.set(3);
    assert_eq!(seen.borrow().last(), Some(&30));
}

// ----------------------------------------------------------------------------
// Configuration and host timers
// ----------------------------------------------------------------------------

#[test]
fn delay_loaded_from_json() {
    let timers = timers();
    let config = EngineConfig::from_json(r#"{ "deactivation_delay_ms": 50 }"#).unwrap();
    configure(config).unwrap();

    let source = signal(0);
    let log = record(&source);
    let read = source.clone();
    effect(move |_| {
        read.get();
    })
    .dispose();

    timers.advance(Duration::from_millis(49));
    assert_eq!(*log.borrow(), vec![true]);
    timers.advance(Duration::from_millis(1));
    assert_eq!(*log.borrow(), vec![true, false]);
}

#[test]
fn out_of_range_delay_is_rejected() {
    let err = configure(EngineConfig {
        deactivation_delay_ms: u64::MAX,
    })
    .unwrap_err();
    assert!(matches!(err, ReactiveError::ConfigOutOfRange { .. }));

    let err = EngineConfig::from_json("{ \"deactivation_delay_ms\": \"soon\" }").unwrap_err();
    assert!(matches!(err, ReactiveError::InvalidConfig(_)));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn tokio_timers_drive_deactivation() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let timers = TokioScheduler::new();
            set_scheduler(timers.clone());

            let source = signal(0);
            let log = record(&source);
            let read = source.clone();
            effect(move |_| {
                read.get();
            })
            .dispose();
            assert_eq!(timers.pending(), 1);

            tokio::time::sleep(Duration::from_millis(999)).await;
            assert_eq!(*log.borrow(), vec![true]);

            tokio::time::sleep(Duration::from_millis(2)).await;
            assert_eq!(*log.borrow(), vec![true, false]);
            assert_eq!(timers.pending(), 0);
        })
        .await;
}

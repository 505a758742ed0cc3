use bramble::{attach, pin, Atomic, Ordering, Shared};
use std::sync::Arc;
use std::thread;

#[test]
fn test_nested_pin() {
    let atomic = Atomic::new(Box::into_raw(Box::new(1u32)));

    let outer = pin();
    let a = atomic.load(Ordering::Acquire, &outer);
    {
        let inner = pin();
        let b = atomic.load(Ordering::Acquire, &inner);
        assert_eq!(a, b);
        drop(inner);
    }
    // Outer guard still protects the load.
    assert_eq!(unsafe { *a.deref() }, 1);
    let a_raw = a.as_raw();
    drop(outer);

    unsafe { drop(Box::from_raw(a_raw)) };
}

#[test]
fn test_tag_roundtrip() {
    let raw = Box::into_raw(Box::new(42u64));
    let guard = pin();
    let atomic = Atomic::new(raw);

    let clean = atomic.load(Ordering::Acquire, &guard);
    assert_eq!(clean.tag(), 0);

    let marked = clean.with_tag(1);
    assert_eq!(marked.tag(), 1);
    assert_eq!(marked.as_raw(), raw);
    assert!(!marked.is_null());

    // Tag participates in CAS: expecting the unmarked pointer fails after
    // the mark lands.
    atomic
        .compare_exchange(clean, marked, Ordering::AcqRel, Ordering::Acquire, &guard)
        .expect("unmarked -> marked");
    assert!(atomic
        .compare_exchange(
            clean,
            Shared::null(),
            Ordering::AcqRel,
            Ordering::Acquire,
            &guard,
        )
        .is_err());

    let now = atomic.load(Ordering::Acquire, &guard);
    assert_eq!(now.tag(), 1);
    assert_eq!(unsafe { *now.deref() }, 42);

    drop(guard);
    unsafe { drop(Box::from_raw(raw)) };
}

#[test]
fn test_many_threads_register_and_recycle() {
    // More spawns than the slot table holds; ids must recycle via detach.
    for _ in 0..4 {
        let mut handles = vec![];
        for _ in 0..64 {
            handles.push(thread::spawn(|| {
                let _reg = attach();
                let _guard = pin();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}

#[test]
fn test_shared_cas_visibility() {
    let atomic = Arc::new(Atomic::<u64>::null());
    let mut handles = vec![];

    // Exactly one thread wins the null -> value race.
    for i in 0..8u64 {
        let a = atomic.clone();
        handles.push(thread::spawn(move || {
            let _reg = attach();
            let guard = pin();
            let candidate = Box::into_raw(Box::new(i));
            let won = a
                .compare_exchange(
                    Shared::null(),
                    unsafe { Shared::from_raw(candidate) },
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                )
                .is_ok();
            if !won {
                unsafe { drop(Box::from_raw(candidate)) };
            }
            won
        }));
    }

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|w| *w)
        .count();
    assert_eq!(winners, 1);

    let guard = pin();
    let v = atomic.load(Ordering::Acquire, &guard);
    assert!(!v.is_null());
    unsafe { drop(Box::from_raw(v.as_raw())) };
}

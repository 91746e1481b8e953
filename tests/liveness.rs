mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use common::{init_logging, serial, ty};
use memscope::{AccessError, ErrorKind, Scope, Value, assign};

#[test]
fn stale_handle_reports_dead_scope() {
    init_logging();
    let scope = Scope::new();
    let int32 = scope.allocate(&ty("i")).unwrap();
    int32.set(5i32).unwrap();
    scope.close();
    let err = int32.get().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Liveness);
    assert!(err.to_string().contains("scope is not alive"), "message was {err}");
}

#[test]
fn every_derived_handle_dies_with_its_scope() {
    let scope = Scope::new();
    let record = scope.allocate_struct(&ty("[i(a) 4S(b) P:i(c)]")).unwrap();
    let array = record.address_of("b").unwrap().as_array().unwrap();
    let element = array.at(1).unwrap();
    let shifted = element.offset(1);
    let recast = record.ptr().cast(&ty("[C C C C]"));
    let field = record.address_of("a").unwrap();

    for check in [element.get(), shifted.get(), recast.get(), field.get(), record.get("c")] {
        assert!(check.is_ok());
    }
    scope.close();

    let results = [
        element.get(),
        shifted.get(),
        recast.get(),
        field.get(),
        record.get("c"),
        array.get(0),
    ];
    for result in results {
        assert_eq!(result.unwrap_err(), AccessError::ScopeNotAlive);
    }
    assert_eq!(field.set(1i32).unwrap_err(), AccessError::ScopeNotAlive);
    assert_eq!(array.to_vec().unwrap_err(), AccessError::ScopeNotAlive);
    assert_eq!(record.address_of("c").unwrap().deref().unwrap_err(), AccessError::ScopeNotAlive);
    assert_eq!(assign(&element, &shifted).unwrap_err(), AccessError::ScopeNotAlive);
}

#[test]
fn assign_needs_both_scopes_alive() {
    let live = Scope::new();
    let doomed = Scope::new();
    let kept = live.allocate(&ty("i")).unwrap();
    let lost = doomed.allocate(&ty("i")).unwrap();
    kept.set(4i32).unwrap();
    assign(&kept, &lost).unwrap();
    assert_eq!(lost.get().unwrap(), Value::Int(4));

    doomed.close();
    assert_eq!(assign(&kept, &lost).unwrap_err(), AccessError::ScopeNotAlive);
    assert_eq!(assign(&lost, &kept).unwrap_err(), AccessError::ScopeNotAlive);
    assert_eq!(kept.get().unwrap(), Value::Int(4), "the live side is untouched");

    let child = live.fork().unwrap();
    let inner = child.allocate(&ty("i")).unwrap();
    live.close();
    assert_eq!(assign(&inner, &inner).unwrap_err(), AccessError::ScopeNotAlive);
}

#[test]
fn closing_a_parent_closes_its_children() {
    let parent = Scope::new();
    let child = parent.fork().unwrap();
    let grandchild = child.fork().unwrap();
    let deep = grandchild.allocate(&ty("d")).unwrap();
    assert_eq!(parent.children(), [child.clone()]);
    assert_eq!(grandchild.parent(), Some(child.clone()));

    parent.close();
    assert!(!child.is_alive());
    assert!(!grandchild.is_alive());
    assert_eq!(deep.get().unwrap_err(), AccessError::ScopeNotAlive);
    assert_eq!(child.fork().unwrap_err(), AccessError::ScopeNotAlive);
    assert!(matches!(
        grandchild.allocate(&ty("i")),
        Err(AccessError::ScopeNotAlive)
    ));
}

#[test]
fn closing_a_child_leaves_the_parent_alive() {
    let parent = Scope::new();
    let kept = parent.allocate(&ty("i")).unwrap();
    let child = parent.fork().unwrap();
    let lost = child.allocate(&ty("i")).unwrap();
    child.close();
    child.close();
    assert!(parent.is_alive());
    assert!(kept.set(3i32).is_ok());
    assert_eq!(lost.get().unwrap_err(), AccessError::ScopeNotAlive);
}

#[test]
fn scoped_closes_on_exit() {
    let escaped = Scope::scoped(|scope| {
        let ptr = scope.allocate(&ty("j")).unwrap();
        ptr.set(9i64).unwrap();
        assert_eq!(ptr.get().unwrap(), Value::Int(9));
        ptr
    });
    assert!(!escaped.is_alive());
    assert_eq!(escaped.get().unwrap_err(), AccessError::ScopeNotAlive);
}

#[test]
fn global_scope_survives_close() {
    let _guard = serial();
    let global = Scope::global();
    let ptr = global.allocate(&ty("i")).unwrap();
    global.close();
    assert!(global.is_alive());
    assert!(Scope::global().is_global());
    ptr.set(11i32).unwrap();
    assert_eq!(ptr.get().unwrap(), Value::Int(11));
}

#[test]
fn concurrent_access_and_close_never_tears() {
    init_logging();
    for _ in 0..16 {
        let scope = Scope::new();
        let counter = scope.allocate(&ty("J")).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let counter = counter.clone();
                let stop = stop.clone();
                thread::spawn(move || {
                    let mut writes = 0u64;
                    while !stop.load(Ordering::Relaxed) {
                        match counter.set(worker as u64) {
                            Ok(()) => writes += 1,
                            Err(err) => {
                                assert_eq!(err, AccessError::ScopeNotAlive);
                                return writes;
                            }
                        }
                        match counter.get() {
                            Ok(Value::UInt(seen)) => assert!(seen < 4, "torn read {seen}"),
                            Ok(other) => panic!("unexpected value {other:?}"),
                            Err(err) => {
                                assert_eq!(err, AccessError::ScopeNotAlive);
                                return writes;
                            }
                        }
                    }
                    writes
                })
            })
            .collect();
        thread::yield_now();
        scope.close();
        stop.store(true, Ordering::Relaxed);
        for worker in workers {
            worker.join().expect("worker panicked");
        }
        assert_eq!(counter.get().unwrap_err(), AccessError::ScopeNotAlive);
    }
}

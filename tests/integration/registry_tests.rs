//! Handler registry resolution and concurrent access.

use std::sync::Arc;
use std::thread;

use edgelink::error::Error;
use edgelink::messaging::message::{RequestMessage, RequestMethod, ResponseMessage};
use edgelink::messaging::registry::{HandlerRef, HandlerRegistry};

fn replying(status: u16) -> HandlerRef {
    HandlerRef::new(move |_: &RequestMessage, resp: &mut ResponseMessage| resp.reply(status, ""))
}

fn resolve(registry: &HandlerRegistry, endpoint: &str, path: &str) -> u16 {
    let request = RequestMessage::new(endpoint, RequestMethod::Get, path);
    let mut response = ResponseMessage::default();
    registry.lookup(endpoint, path).handle(&request, &mut response);
    response.status_code
}

#[test]
fn full_fallback_chain() {
    let r = HandlerRegistry::new(8);
    // Registration order must not influence specificity.
    r.register("dev", "status", replying(201)).unwrap();
    r.register("*", "*", replying(204)).unwrap();
    r.register("*", "status", replying(202)).unwrap();
    r.register("dev", "*", replying(203)).unwrap();

    assert_eq!(resolve(&r, "dev", "status"), 201);
    for (endpoint, path, next) in [
        ("dev", "status", 202),
        ("*", "status", 203),
        ("dev", "*", 204),
        ("*", "*", 404),
    ] {
        r.unregister(endpoint, path).unwrap();
        assert_eq!(resolve(&r, "dev", "status"), next, "after removing ({endpoint}, {path})");
    }
    assert!(r.is_empty());
}

#[test]
fn wildcards_only_match_their_own_side() {
    let r = HandlerRegistry::new(8);
    r.register("dev", "*", replying(203)).unwrap();
    r.register("*", "status", replying(202)).unwrap();

    assert_eq!(resolve(&r, "other", "config"), 404);
    assert_eq!(resolve(&r, "other", "status"), 202);
    assert_eq!(resolve(&r, "dev", "config"), 203);
}

#[test]
fn unregister_never_registered_is_success() {
    let r = HandlerRegistry::new(8);
    r.register("dev", "a", replying(200)).unwrap();
    assert_eq!(r.unregister("ghost", "*"), Ok(()));
    assert_eq!(r.unregister_all(replying(200)), Ok(()));
    assert_eq!(r.len(), 1);
}

#[test]
fn register_rejects_null_and_overflow() {
    let r = HandlerRegistry::new(1);
    assert_eq!(r.register("dev", "a", None::<HandlerRef>), Err(Error::InvalidArgument));
    r.register("dev", "a", replying(200)).unwrap();
    assert_eq!(r.register("dev", "b", replying(200)), Err(Error::OutOfMemory));
}

#[test]
fn lookups_stay_consistent_during_concurrent_registration() {
    let r = Arc::new(HandlerRegistry::new(64));
    r.register("*", "*", replying(299)).unwrap();

    let writer = {
        let r = Arc::clone(&r);
        thread::spawn(move || {
            for round in 0..200 {
                let path = format!("p{}", round % 8);
                r.register("dev", &path, replying(200)).unwrap();
                r.unregister("dev", &path).unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let r = Arc::clone(&r);
            thread::spawn(move || {
                for round in 0..500 {
                    let status = resolve(&r, "dev", &format!("p{}", round % 8));
                    assert!(status == 200 || status == 299, "unexpected {status}");
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(r.len(), 1);
}

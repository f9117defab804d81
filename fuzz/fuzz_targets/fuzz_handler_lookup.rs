//! Fuzz target: `HandlerRegistry` register / unregister / lookup
//!
//! Interprets the input as a script of registry operations over a tiny
//! alphabet of endpoints and paths, and checks every lookup against a
//! straightforward model of the four-step specificity search.
//!
//! cargo fuzz run fuzz_handler_lookup

#![no_main]

use edgelink::messaging::message::{RequestMessage, RequestMethod, ResponseMessage};
use edgelink::messaging::registry::{HandlerRef, HandlerRegistry};
use libfuzzer_sys::fuzz_target;

const ENDPOINTS: [&str; 3] = ["*", "a", "b"];
const PATHS: [&str; 3] = ["*", "x", "y"];
const CAPACITY: usize = 6;

fn status_of(registry: &HandlerRegistry, endpoint: &str, path: &str) -> u16 {
    let request = RequestMessage::new(endpoint, RequestMethod::Get, path);
    let mut response = ResponseMessage::default();
    registry.lookup(endpoint, path).handle(&request, &mut response);
    response.status_code
}

fuzz_target!(|data: &[u8]| {
    let registry = HandlerRegistry::new(CAPACITY);
    // Model: (endpoint, path, status) in registration order.
    let mut model: Vec<(&str, &str, u16)> = Vec::new();

    for chunk in data.chunks(2) {
        let [op, arg] = [chunk[0], *chunk.get(1).unwrap_or(&0)];
        let ep = ENDPOINTS[(arg % 3) as usize];
        let path = PATHS[((arg / 3) % 3) as usize];
        match op % 3 {
            0 => {
                let status = 200 + u16::from(arg);
                let replaced = model.iter().any(|(e, p, _)| *e == ep && *p == path);
                let result = registry.register(
                    ep,
                    path,
                    HandlerRef::new(move |_: &RequestMessage, r: &mut ResponseMessage| {
                        r.reply(status, "")
                    }),
                );
                if replaced || model.len() < CAPACITY {
                    assert!(result.is_ok());
                    model.retain(|(e, p, _)| !(*e == ep && *p == path));
                    model.push((ep, path, status));
                } else {
                    assert!(result.is_err());
                }
            }
            1 => {
                assert!(registry.unregister(ep, path).is_ok());
                model.retain(|(e, p, _)| !(*e == ep && *p == path));
            }
            _ => {
                if ep == "*" || path == "*" {
                    continue;
                }
                let expected = [(ep, path), ("*", path), (ep, "*"), ("*", "*")]
                    .iter()
                    .find_map(|(e, p)| {
                        model
                            .iter()
                            .rev()
                            .find(|(me, mp, _)| me == e && mp == p)
                            .map(|(_, _, s)| *s)
                    })
                    .unwrap_or(404);
                assert_eq!(status_of(&registry, ep, path), expected);
            }
        }
        assert_eq!(registry.len(), model.len());
    }
});

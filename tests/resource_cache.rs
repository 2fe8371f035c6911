use std::cell::Cell;
use std::rc::Rc;

use shrike_engine::cache::{ResourceCache, ResourceError};

#[derive(Default)]
struct Blob {
    payload: String,
}

fn started_cache() -> ResourceCache<Blob> {
    let mut cache = ResourceCache::new();
    cache.start().expect("start cache");
    cache
}

#[test]
fn retrieve_returns_the_same_instance_for_a_path() {
    let mut cache = started_cache();
    let first = cache
        .retrieve("images/ship.png", false, |_, blob| {
            blob.payload = "ship".into();
            Ok(())
        })
        .expect("first retrieve");
    let second = cache
        .retrieve("images/ship.png", false, |_, _| {
            panic!("cached path must not reload");
        })
        .expect("second retrieve");
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(second.borrow().payload, "ship");
    assert_eq!(cache.live_count(), 1);
}

#[test]
fn failed_loads_are_negative_cached() {
    let mut cache = started_cache();
    let attempts = Cell::new(0usize);
    let result = cache.retrieve("missing.png", false, |path, _| {
        attempts.set(attempts.get() + 1);
        Err(ResourceError::NotFound(path.to_string()))
    });
    assert!(matches!(result, Err(ResourceError::NotFound(_))));

    let result = cache.retrieve("missing.png", false, |_, _| {
        attempts.set(attempts.get() + 1);
        Ok(())
    });
    assert!(matches!(result, Err(ResourceError::NotFound(_))));
    assert_eq!(attempts.get(), 1, "a negative-cached path must not be loaded again");
}

#[test]
fn clearing_failures_allows_a_retry() {
    let mut cache = started_cache();
    let _ = cache.retrieve("late.png", false, |path, _| {
        Err(ResourceError::NotFound(path.to_string()))
    });
    cache.clear_failures();
    let handle = cache
        .retrieve("late.png", false, |_, blob| {
            blob.payload = "second try".into();
            Ok(())
        })
        .expect("retry after clear_failures");
    assert_eq!(handle.borrow().payload, "second try");
}

#[test]
fn pinned_entries_survive_dropping_external_handles() {
    let mut cache = started_cache();
    let handle = cache
        .retrieve("fonts/default.png", true, |_, blob| {
            blob.payload = "glyphs".into();
            Ok(())
        })
        .expect("persistent retrieve");
    let identity = Rc::as_ptr(&handle) as usize;
    drop(handle);

    let again = cache
        .retrieve("fonts/default.png", false, |_, _| {
            panic!("pinned entry must not reload");
        })
        .expect("retrieve after drop");
    assert_eq!(identity, Rc::as_ptr(&again) as usize);
    assert_eq!(again.borrow().payload, "glyphs");
}

#[test]
fn unpinned_entries_are_reloaded_after_collection() {
    let mut cache = started_cache();
    let attempts = Cell::new(0usize);
    let mut load = |_: &str, blob: &mut Blob| -> Result<(), ResourceError> {
        attempts.set(attempts.get() + 1);
        blob.payload = format!("load {}", attempts.get());
        Ok(())
    };
    let handle = cache.retrieve("transient.png", false, &mut load).expect("first load");
    drop(handle);
    assert_eq!(cache.live_count(), 0);
    let handle = cache.retrieve("transient.png", false, &mut load).expect("reload");
    assert_eq!(attempts.get(), 2);
    assert_eq!(handle.borrow().payload, "load 2");
}

#[test]
fn process_visits_exactly_the_live_set() {
    let mut cache = started_cache();
    let loaded: Vec<_> = ["a.png", "b.png", "c.png"]
        .iter()
        .map(|path| cache.retrieve(path, false, |_, _| Ok(())).expect("load"))
        .collect();
    let _ = cache.retrieve("broken.png", false, |path, _| {
        Err(ResourceError::NotFound(path.to_string()))
    });

    let mut visited = Vec::new();
    cache
        .process(|path, _| {
            visited.push(path.to_string());
            Ok(())
        })
        .expect("process");
    visited.sort();
    assert_eq!(visited, vec!["a.png", "b.png", "c.png"]);
    drop(loaded);
}

#[test]
fn process_stops_at_the_first_visitor_error() {
    let mut cache = started_cache();
    let _a = cache.retrieve("a.png", false, |_, _| Ok(())).expect("load");
    let _b = cache.retrieve("b.png", false, |_, _| Ok(())).expect("load");
    let visited = Cell::new(0usize);
    let result = cache.process(|_, _| {
        visited.set(visited.get() + 1);
        Err(ResourceError::InvalidArgument("visitor failure"))
    });
    assert!(matches!(result, Err(ResourceError::InvalidArgument(_))));
    assert_eq!(visited.get(), 1);
}

#[test]
fn path_of_is_the_inverse_of_retrieve() {
    let mut cache = started_cache();
    let handle = cache.retrieve("ui/panel.png", false, |_, _| Ok(())).expect("load");
    assert_eq!(cache.path_of(&handle), Some("ui/panel.png"));

    let foreign = Rc::new(std::cell::RefCell::new(Blob::default()));
    assert_eq!(cache.path_of(&foreign), None);
}

#[test]
fn lifecycle_guards_and_stop() {
    let mut cache: ResourceCache<Blob> = ResourceCache::new();
    let result = cache.retrieve("early.png", false, |_, _| Ok(()));
    assert!(matches!(result, Err(ResourceError::InvalidArgument(_))));

    cache.start().expect("start");
    assert!(matches!(cache.start(), Err(ResourceError::InvalidArgument(_))));

    let pinned = cache.retrieve("pinned.png", true, |_, _| Ok(())).expect("load");
    cache.stop();
    assert!(!cache.is_started());
    assert_eq!(cache.path_of(&pinned), None);
}

//! End-to-end readiness scenarios driven through the public API.

use std::{
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use soroi::{
    Error, Feature, FeatureSet, Introspectable, ReadinessHelper, ReadyRequest, Status,
};
use tokio::{
    sync::oneshot,
    time::{sleep, timeout},
};

const CONNECTING: Status = Status(1);
const CONNECTED: Status = Status(2);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Let the driver task process everything queued so far.
async fn settle() {
    sleep(Duration::from_millis(20)).await;
}

async fn within<F: Future>(fut: F) -> F::Output {
    timeout(Duration::from_secs(1), fut)
        .await
        .expect("timed out waiting for readiness")
}

/// Introspectable that counts invocations and reports ready at once.
fn counted(calls: &Arc<AtomicUsize>) -> Introspectable {
    let calls = calls.clone();
    Introspectable::new(move |cx| {
        calls.fetch_add(1, Ordering::SeqCst);
        cx.report_ready();
    })
}

/// Introspectable that reports ready only once the gate is released.
fn gated(gate: oneshot::Receiver<()>) -> Introspectable {
    Introspectable::new(move |cx| {
        tokio::spawn(async move {
            let _ = gate.await;
            cx.report_ready();
        });
    })
}

#[tokio::test]
async fn core_feature_becomes_ready() {
    init_tracing();
    let core = Feature::new("core");
    let calls = Arc::new(AtomicUsize::new(0));
    let helper = ReadinessHelper::builder()
        .register(core.clone(), counted(&calls).applicable_in([CONNECTED]))
        .spawn()
        .unwrap();

    helper.set_status(CONNECTED);
    let request = helper.become_ready([core.clone()]);
    // Resolution is never synchronous with the call.
    assert!(!request.is_finished());

    within(request.finished()).await.unwrap();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(helper.is_ready(&FeatureSet::from([core.clone()])));
    assert!(helper.actual_features().contains(&core));
    assert!(helper.missing_features().is_empty());
    assert_eq!(helper.current_status(), CONNECTED);
}

#[tokio::test]
async fn absent_interface_marks_feature_missing() {
    let core = Feature::new("core");
    let avatar = Feature::new("avatar");
    let avatar_calls = Arc::new(AtomicUsize::new(0));
    let (release, gate) = oneshot::channel();
    let helper = ReadinessHelper::builder()
        .register(core.clone(), gated(gate))
        .register(
            avatar.clone(),
            counted(&avatar_calls)
                .depends_on([core.clone()])
                .requires_interface("Avatar"),
        )
        .spawn()
        .unwrap();

    // Interfaces are known (Avatar absent) before core settles.
    helper.set_interfaces(["Account"]);
    let request = helper.become_ready([core.clone(), avatar.clone()]);
    settle().await;
    assert!(!request.is_finished());

    release.send(()).unwrap();
    within(request.finished()).await.unwrap();
    settle().await;

    assert_eq!(avatar_calls.load(Ordering::SeqCst), 0);
    assert!(helper.actual_features().contains(&core));
    assert!(helper.missing_features().contains(&avatar));
    // A missing non-critical feature still counts as ready.
    assert!(helper.is_ready(&FeatureSet::from([core, avatar])));
}

#[tokio::test]
async fn critical_failure_poisons_helper() {
    let x = Feature::critical("x");
    let y = Feature::new("y");
    let helper = ReadinessHelper::builder()
        .register(x.clone(), Introspectable::new(|cx| cx.report_failed("boom")))
        .register(
            y.clone(),
            Introspectable::new(|cx| cx.report_ready()).depends_on([x.clone()]),
        )
        .spawn()
        .unwrap();

    let expected = Error::CriticalFailure {
        feature: "x".into(),
        message: "boom".into(),
    };

    let request = helper.become_ready([x.clone(), y.clone()]);
    assert_eq!(within(request.finished()).await, Err(expected.clone()));

    // Later requests reject with the same captured error.
    let late = helper.become_ready([y.clone()]);
    assert_eq!(within(late.finished()).await, Err(expected.clone()));

    settle().await;
    assert_eq!(helper.fatal_error(), Some(expected));
    assert!(!helper.is_ready(&FeatureSet::from([y])));
    assert!(helper.actual_features().is_empty());
}

#[tokio::test]
async fn non_critical_failure_is_absorbed_as_missing() {
    let flaky = Feature::new("flaky");
    let helper = ReadinessHelper::builder()
        .register(
            flaky.clone(),
            Introspectable::new(|cx| cx.report_failed("remote error")),
        )
        .spawn()
        .unwrap();

    let request = helper.become_ready([flaky.clone()]);
    within(request.finished()).await.unwrap();
    settle().await;
    assert!(helper.missing_features().contains(&flaky));
    assert_eq!(helper.fatal_error(), None);
}

#[tokio::test]
async fn overlapping_requests_resolve_independently() {
    let a = Feature::new("a");
    let b = Feature::new("b");
    let (release, gate) = oneshot::channel();
    let helper = ReadinessHelper::builder()
        .register(a.clone(), Introspectable::new(|cx| cx.report_ready()))
        .register(b.clone(), gated(gate))
        .spawn()
        .unwrap();

    let first = helper.become_ready([a.clone()]);
    let both = helper.become_ready([a.clone(), b.clone()]);

    within(first.finished()).await.unwrap();
    settle().await;
    assert!(!both.is_finished());

    release.send(()).unwrap();
    within(both.finished()).await.unwrap();
}

#[tokio::test]
async fn subset_request_after_superset_does_no_new_work() {
    let a = Feature::new("a");
    let b = Feature::new("b");
    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));
    let helper = ReadinessHelper::builder()
        .register(a.clone(), counted(&a_calls))
        .register(b.clone(), counted(&b_calls))
        .spawn()
        .unwrap();

    within(helper.become_ready([a.clone(), b.clone()]).finished())
        .await
        .unwrap();

    let again = helper.become_ready([a.clone()]);
    within(again.finished()).await.unwrap();

    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unregistered_feature_is_soft_missing() {
    let ghost = Feature::new("ghost");
    let helper = ReadinessHelper::builder().spawn().unwrap();

    let request = helper.become_ready([ghost.clone()]);
    within(request.finished()).await.unwrap();
    settle().await;

    assert!(helper.missing_features().contains(&ghost));
    assert!(helper.requested_features().contains(&ghost));
    assert!(helper.is_ready(&FeatureSet::from([ghost])));
}

#[tokio::test]
async fn introspection_runs_in_registration_order() {
    let order: Arc<Mutex<Vec<String>>> = Arc::default();
    let recording = |order: &Arc<Mutex<Vec<String>>>| {
        let order = order.clone();
        Introspectable::new(move |cx| {
            order.lock().unwrap().push(cx.feature().id().to_string());
            cx.report_ready();
        })
    };

    let features = [Feature::new("b"), Feature::new("a"), Feature::new("c")];
    let mut builder = ReadinessHelper::builder();
    for feature in &features {
        builder = builder.register(feature.clone(), recording(&order));
    }
    let helper = builder.spawn().unwrap();

    within(helper.become_ready(features.clone()).finished())
        .await
        .unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["b", "a", "c"]);
}

#[tokio::test]
async fn feature_waits_for_applicable_status() {
    let core = Feature::new("core");
    let calls = Arc::new(AtomicUsize::new(0));
    let helper = ReadinessHelper::builder()
        .register(core.clone(), counted(&calls).applicable_in([CONNECTED]))
        .spawn()
        .unwrap();

    helper.set_status(CONNECTING);
    let request = helper.become_ready([core.clone()]);
    settle().await;
    // Inapplicable status defers the feature, it does not fail it.
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!request.is_finished());

    helper.set_status(CONNECTED);
    within(request.finished()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalidation_rejects_pending_and_future_requests() {
    let stuck = Feature::new("stuck");
    let (_release, gate) = oneshot::channel();
    let helper = ReadinessHelper::builder()
        .register(stuck.clone(), gated(gate))
        .spawn()
        .unwrap();

    let request = helper.become_ready([stuck.clone()]);
    settle().await;
    assert!(!request.is_finished());

    helper.invalidate("connection died");
    let expected = Error::Invalidated("connection died".into());
    assert_eq!(within(request.finished()).await, Err(expected.clone()));

    let late = helper.become_ready([stuck]);
    assert_eq!(within(late.finished()).await, Err(expected));
}

#[tokio::test]
async fn dropping_all_handles_aborts_pending_requests() {
    let stuck = Feature::new("stuck");
    let (_release, gate) = oneshot::channel();
    let helper = ReadinessHelper::builder()
        .register(stuck.clone(), gated(gate))
        .spawn()
        .unwrap();

    let request = helper.become_ready([stuck]);
    settle().await;
    drop(helper);

    assert_eq!(within(request.finished()).await, Err(Error::EngineGone));
}

#[tokio::test]
async fn observer_registered_after_resolution_still_fires() {
    let core = Feature::new("core");
    let helper = ReadinessHelper::builder()
        .register(core.clone(), Introspectable::new(|cx| cx.report_ready()))
        .spawn()
        .unwrap();

    let request: ReadyRequest = helper.become_ready([core]);
    within(request.finished()).await.unwrap();

    let (tx, rx) = oneshot::channel();
    request.on_finished(move |result| {
        let _ = tx.send(result);
    });
    assert_eq!(within(rx).await.unwrap(), Ok(()));
}

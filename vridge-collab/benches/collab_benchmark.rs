use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use tokio::time::Instant;
use vridge_collab::presence::{CollaborationSession, CursorPosition, PresenceMessage};
use vridge_collab::project::{Milestone, ProjectMember, ProjectState, SyncState};
use vridge_collab::{Envelope, LocalUser, SyncConfig};

fn cursor_frame() -> String {
    PresenceMessage::Move(CursorPosition::new(412.5, 88.0, 1_700_000_000_000).on_element("canvas"))
        .into_envelope("peer-1")
        .unwrap()
        .encode()
        .unwrap()
}

fn bench_envelope_decode(c: &mut Criterion) {
    let frame = cursor_frame();

    c.bench_function("envelope_decode_cursor_move", |b| {
        b.iter(|| {
            black_box(Envelope::decode(black_box(&frame)).unwrap());
        })
    });
}

fn bench_envelope_encode(c: &mut Criterion) {
    let envelope = Envelope::decode(&cursor_frame()).unwrap();

    c.bench_function("envelope_encode_cursor_move", |b| {
        b.iter(|| {
            black_box(black_box(&envelope).encode().unwrap());
        })
    });
}

fn bench_presence_dispatch(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let _guard = runtime.enter();

    let mut session = CollaborationSession::new(
        "bench",
        LocalUser::new("local", "Local"),
        &SyncConfig::default(),
        Instant::now(),
    );
    let frames: Vec<String> = (0..100)
        .map(|i| {
            PresenceMessage::Move(CursorPosition::new(f64::from(i), 0.0, i64::from(i)))
                .into_envelope(&format!("peer-{}", i % 10))
                .unwrap()
                .encode()
                .unwrap()
        })
        .collect();

    c.bench_function("presence_dispatch_100_moves_10_peers", |b| {
        b.iter(|| {
            for frame in &frames {
                let envelope = Envelope::decode(frame).unwrap();
                black_box(session.handle_envelope(&envelope));
            }
        })
    });
}

fn bench_project_dispatch(c: &mut Criterion) {
    let mut project = ProjectState::new("p-1", "Bench");
    for i in 0..50 {
        project.members.push(ProjectMember::new(format!("u-{i}"), format!("User {i}"), Default::default()));
        project.milestones.push(Milestone::new(format!("m-{i}"), format!("Milestone {i}")));
    }
    let mut state = SyncState::new("p-1", "local");
    state.load(project);

    let frames: Vec<String> = (0..100)
        .map(|i| {
            let envelope = if i % 2 == 0 {
                Envelope::new("project.milestone.update", "peer", json!({ "id": format!("m-{}", i % 50), "progress": i }))
            } else {
                Envelope::new("project.member.online", "peer", json!({ "userId": format!("u-{}", i % 50) }))
            };
            envelope.encode().unwrap()
        })
        .collect();

    c.bench_function("project_dispatch_100_messages", |b| {
        b.iter(|| {
            for frame in &frames {
                let envelope = Envelope::decode(frame).unwrap();
                black_box(state.handle_envelope(&envelope));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_envelope_decode,
    bench_envelope_encode,
    bench_presence_dispatch,
    bench_project_dispatch,
);
criterion_main!(benches);

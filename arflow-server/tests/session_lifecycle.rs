//! Session lifecycle through the RPC surface, against the in-memory
//! recorder.

use std::collections::HashSet;
use std::sync::Arc;

use tonic::Request;

use arflow_proto::v1::ar_flow_service_server::ArFlowService;
use arflow_proto::v1::{
    CreateSessionRequest, DeleteSessionRequest, Device, GetSessionRequest, JoinSessionRequest,
    LeaveSessionRequest, ListSessionsRequest, Session, SessionMetadata, SessionUuid, device,
};
use arflow_recorder::MemoryRecorder;
use arflow_server::ArFlowServicer;

fn device(uid: &str) -> Device {
    Device {
        model: "m".into(),
        name: "n".into(),
        r#type: device::Type::Handheld as i32,
        uid: uid.into(),
    }
}

fn live_servicer() -> (Arc<MemoryRecorder>, ArFlowServicer) {
    let recorder = Arc::new(MemoryRecorder::new());
    let servicer = ArFlowServicer::new(Arc::clone(&recorder), true, None).unwrap();
    (recorder, servicer)
}

async fn create(servicer: &ArFlowServicer, dev: &Device) -> Session {
    servicer
        .create_session(Request::new(CreateSessionRequest {
            device: Some(dev.clone()),
            session_metadata: Some(SessionMetadata {
                name: "test".into(),
                save_path: String::new(),
            }),
        }))
        .await
        .unwrap()
        .into_inner()
        .session
        .unwrap()
}

fn id_of(session: &Session) -> SessionUuid {
    session.id.clone().unwrap()
}

#[tokio::test]
async fn create_join_leave_delete_roundtrip() {
    let (_, servicer) = live_servicer();
    let a = device("a");
    let b = device("b");

    let session = create(&servicer, &a).await;
    let id = id_of(&session);
    assert_eq!(id.value.len(), 36);
    assert_eq!(session.devices, vec![a.clone()]);

    servicer
        .join_session(Request::new(JoinSessionRequest {
            session_id: Some(id.clone()),
            device: Some(b.clone()),
        }))
        .await
        .unwrap();

    let listed = servicer
        .list_sessions(Request::new(ListSessionsRequest {}))
        .await
        .unwrap()
        .into_inner()
        .sessions;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].devices, vec![a.clone(), b.clone()]);

    servicer
        .leave_session(Request::new(LeaveSessionRequest {
            session_id: Some(id.clone()),
            device: Some(a.clone()),
        }))
        .await
        .unwrap();
    let got = servicer
        .get_session(Request::new(GetSessionRequest {
            session_id: Some(id.clone()),
        }))
        .await
        .unwrap()
        .into_inner()
        .session
        .unwrap();
    assert_eq!(got.devices, vec![b.clone()]);

    servicer
        .delete_session(Request::new(DeleteSessionRequest {
            session_id: Some(id.clone()),
        }))
        .await
        .unwrap();
    let err = servicer
        .get_session(Request::new(GetSessionRequest {
            session_id: Some(id),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::NotFound);
}

#[tokio::test]
async fn session_ids_are_unique() {
    let (_, servicer) = live_servicer();
    let mut ids = HashSet::new();
    for i in 0..8 {
        let session = create(&servicer, &device(&format!("d{i}"))).await;
        assert!(ids.insert(id_of(&session).value));
    }
    let listed = servicer
        .list_sessions(Request::new(ListSessionsRequest {}))
        .await
        .unwrap()
        .into_inner()
        .sessions;
    let listed_ids: HashSet<String> = listed.iter().map(|s| id_of(s).value).collect();
    assert_eq!(listed_ids.len(), listed.len());
}

#[tokio::test]
async fn duplicate_join_is_rejected() {
    let (_, servicer) = live_servicer();
    let a = device("a");
    let session = create(&servicer, &a).await;

    let err = servicer
        .join_session(Request::new(JoinSessionRequest {
            session_id: Some(id_of(&session)),
            device: Some(a),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);

    let got = servicer
        .get_session(Request::new(GetSessionRequest {
            session_id: Some(id_of(&session)),
        }))
        .await
        .unwrap()
        .into_inner()
        .session
        .unwrap();
    assert_eq!(got.devices.len(), 1);
}

#[tokio::test]
async fn leaving_twice_is_not_found() {
    let (_, servicer) = live_servicer();
    let a = device("a");
    let b = device("b");
    let session = create(&servicer, &a).await;
    let id = id_of(&session);

    servicer
        .join_session(Request::new(JoinSessionRequest {
            session_id: Some(id.clone()),
            device: Some(b.clone()),
        }))
        .await
        .unwrap();
    servicer
        .leave_session(Request::new(LeaveSessionRequest {
            session_id: Some(id.clone()),
            device: Some(b.clone()),
        }))
        .await
        .unwrap();
    let err = servicer
        .leave_session(Request::new(LeaveSessionRequest {
            session_id: Some(id),
            device: Some(b),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::NotFound);
}

#[tokio::test]
async fn delete_disconnects_the_recorder_stream() {
    let (recorder, servicer) = live_servicer();
    let session = create(&servicer, &device("a")).await;
    let id = id_of(&session);

    assert!(!recorder.stream(&id.value).unwrap().is_disconnected());
    servicer
        .delete_session(Request::new(DeleteSessionRequest {
            session_id: Some(id.clone()),
        }))
        .await
        .unwrap();
    assert!(recorder.stream(&id.value).unwrap().is_disconnected());
}

#[tokio::test]
async fn deleting_unknown_session_is_not_found() {
    let (_, servicer) = live_servicer();
    let err = servicer
        .delete_session(Request::new(DeleteSessionRequest {
            session_id: Some(SessionUuid {
                value: "no-such-session".into(),
            }),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::NotFound);
}

#[test]
fn mode_conflicts_are_rejected_at_construction() {
    let recorder = Arc::new(MemoryRecorder::new());
    // both modes at once
    assert!(
        ArFlowServicer::new(Arc::clone(&recorder), true, Some("/tmp/x".into())).is_err()
    );
    // neither mode
    assert!(ArFlowServicer::new(Arc::clone(&recorder), false, None).is_err());
    // each mode alone
    assert!(ArFlowServicer::new(Arc::clone(&recorder), true, None).is_ok());
    assert!(ArFlowServicer::new(recorder, false, Some("/tmp/x".into())).is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_joins_never_duplicate() {
    let (_, servicer) = live_servicer();
    let session = create(&servicer, &device("origin")).await;
    let id = id_of(&session);

    let mut tasks = Vec::new();
    for i in 0..100 {
        let servicer = servicer.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            servicer
                .join_session(Request::new(JoinSessionRequest {
                    session_id: Some(id),
                    device: Some(device(&format!("d{i}"))),
                }))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let got = servicer
        .get_session(Request::new(GetSessionRequest {
            session_id: Some(id),
        }))
        .await
        .unwrap()
        .into_inner()
        .session
        .unwrap();
    assert_eq!(got.devices.len(), 101);
    let unique: HashSet<String> = got.devices.iter().map(|d| d.uid.clone()).collect();
    assert_eq!(unique.len(), 101);
}

//! Entity-path construction.
//!
//! Recording addresses follow
//! `<session_name>_<session_id>/<model>_<name>_<uid>/<frame_family>[/...]`.
//! Because the session id segment contains a UUID, two live sessions can
//! never write to overlapping paths.

use arflow_proto::FrameFamily;
use arflow_proto::v1::{Device, Session};

/// Escape one path segment: anything outside the recorder's safe alphabet
/// (`[A-Za-z0-9_.-]`) is backslash-escaped.
pub fn escape_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// Append an escaped segment to `base`.
pub fn join(base: &str, part: &str) -> String {
    format!("{base}/{}", escape_part(part))
}

/// `<session_name>_<session_id>/<model>_<name>_<uid>`
pub fn session_root(session: &Session, device: &Device) -> String {
    let session_name = session
        .metadata
        .as_ref()
        .map(|m| m.name.as_str())
        .unwrap_or_default();
    let session_id = session
        .id
        .as_ref()
        .map(|id| id.value.as_str())
        .unwrap_or_default();
    let session_part = escape_part(&format!("{session_name}_{session_id}"));
    let device_part = escape_part(&format!(
        "{}_{}_{}",
        device.model, device.name, device.uid
    ));
    format!("{session_part}/{device_part}")
}

/// `<session_root>/<frame_family>`
pub fn family_path(session: &Session, device: &Device, family: FrameFamily) -> String {
    format!("{}/{}", session_root(session, device), family.segment())
}

/// `<sub_id_1>_<sub_id_2>` segment identifying a trackable.
pub fn trackable_part(sub_id_1: u64, sub_id_2: u64) -> String {
    format!("{sub_id_1}_{sub_id_2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arflow_proto::v1::{SessionMetadata, SessionUuid};

    fn session(name: &str, id: &str) -> Session {
        Session {
            id: Some(SessionUuid { value: id.into() }),
            metadata: Some(SessionMetadata {
                name: name.into(),
                save_path: String::new(),
            }),
            devices: vec![],
        }
    }

    fn device() -> Device {
        Device {
            model: "pixel".into(),
            name: "cam".into(),
            r#type: 1,
            uid: "u-1".into(),
        }
    }

    #[test]
    fn unsafe_characters_are_escaped() {
        assert_eq!(escape_part("a b"), "a\\ b");
        assert_eq!(escape_part("ok_1.x-y"), "ok_1.x-y");
        assert_eq!(escape_part("a/b"), "a\\/b");
    }

    #[test]
    fn paths_follow_the_convention() {
        let s = session("lab", "0000");
        let d = device();
        assert_eq!(session_root(&s, &d), "lab_0000/pixel_cam_u-1");
        assert_eq!(
            family_path(&s, &d, FrameFamily::Gyroscope),
            "lab_0000/pixel_cam_u-1/gyroscope_frame"
        );
        assert_eq!(join("a/b", "w x"), "a/b/w\\ x");
    }
}

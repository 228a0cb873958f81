//! Unit tests for the Game CRD
//!
//! Covers `GameSpec::validate()`, wire naming of the spec/status, and the
//! phase mapping used by status write-back.

mod game_spec_validation {
    use crate::crd::GameSpec;

    fn valid_spec() -> GameSpec {
        GameSpec {
            title: "Zelda".to_string(),
            file_name: "zelda.rom".to_string(),
        }
    }

    #[test]
    fn test_valid_spec() {
        assert!(valid_spec().validate().is_ok());
    }

    #[test]
    fn test_empty_title_rejected() {
        let mut spec = valid_spec();
        spec.title = String::new();
        let err = spec.validate().unwrap_err();
        assert!(err.contains("title"));
    }

    #[test]
    fn test_whitespace_file_name_rejected() {
        let mut spec = valid_spec();
        spec.file_name = "   ".to_string();
        let err = spec.validate().unwrap_err();
        assert!(err.contains("fileName"));
    }
}

mod serialization {
    use kube::CustomResourceExt;

    use crate::crd::{Game, GameSpec, GameStatus, GatewayConfig, UDPRoute};

    #[test]
    fn test_spec_uses_camel_case() {
        let spec: GameSpec =
            serde_json::from_str(r#"{"title":"Zelda","fileName":"zelda.rom"}"#).unwrap();
        assert_eq!(spec.file_name, "zelda.rom");

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["fileName"], "zelda.rom");
    }

    #[test]
    fn test_status_defaults_to_empty_url() {
        let status: GameStatus = serde_json::from_str("{}").unwrap();
        assert!(status.url.is_empty());
        assert!(!status.is_ready());
    }

    #[test]
    fn test_crd_identity() {
        let crd = Game::crd();
        assert_eq!(crd.spec.group, "stream.indiegamestream.com");
        assert_eq!(crd.spec.names.kind, "Game");
        assert_eq!(crd.spec.scope, "Namespaced");
    }

    #[test]
    fn test_stunner_kinds() {
        assert_eq!(UDPRoute::crd().spec.group, "stunner.l7mp.io");
        assert_eq!(GatewayConfig::crd().spec.names.kind, "GatewayConfig");
    }

    #[test]
    fn test_gateway_config_field_names() {
        let cfg: crate::crd::GatewayConfigSpec = serde_json::from_str(
            r#"{"userName":"user-1","password":"pass-1","authType":"plaintext","realm":"stunner.l7mp.io"}"#,
        )
        .unwrap();
        assert_eq!(cfg.user_name, "user-1");
        assert_eq!(cfg.auth_type, "plaintext");
    }
}

mod phases {
    use std::time::Duration;

    use crate::crd::{Condition, GamePhase, GameStatus};
    use crate::error::Error;

    #[test]
    fn test_phase_from_error() {
        let timeout = Error::Timeout {
            namespace: "default".into(),
            name: "svc".into(),
            after: Duration::from_secs(20),
        };
        assert_eq!(GamePhase::from_error(&timeout), GamePhase::WaitingForAddress);
        assert_eq!(
            GamePhase::from_error(&Error::InvalidSpec("x".into())),
            GamePhase::Failed
        );
        assert_eq!(
            GamePhase::from_error(&Error::DependencyMissing("x".into())),
            GamePhase::Degraded
        );
    }

    #[test]
    fn test_same_state_ignores_transition_time() {
        let mut a = GameStatus {
            url: "http://1.2.3.4".into(),
            phase: GamePhase::Ready,
            conditions: vec![Condition::ready(true, "SessionReady", "ok")],
            ..Default::default()
        };
        let b = a.clone();
        a.conditions[0].last_transition_time = "1970-01-01T00:00:00+00:00".into();
        assert!(a.same_state(&b));

        a.url = "http://5.6.7.8".into();
        assert!(!a.same_state(&b));
    }
}

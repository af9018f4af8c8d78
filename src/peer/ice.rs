use crate::error::PadError;
use crate::peer::types::ServerConfig;
use crate::utils::add_ice_url_scheme;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;

/// Публичные STUN серверы, если пользователь ничего не задал
pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
}

/// Проверка серверов перед использованием
pub fn validate_ice_servers(servers: &[ServerConfig]) -> Result<(), PadError> {
    for server in servers {
        if server.url.trim().is_empty() {
            return Err(PadError::InvalidIceServer(format!(
                "server {} has an empty url",
                server.id
            )));
        }
        if server.r#type != "stun" && server.r#type != "turn" {
            return Err(PadError::InvalidIceServer(format!(
                "server {} has unknown type {:?}",
                server.id, server.r#type
            )));
        }
        if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none()) {
            return Err(PadError::InvalidIceServer(format!(
                "TURN server {} requires username and credential",
                server.id
            )));
        }
    }
    Ok(())
}

pub fn get_user_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

/// Создает конфигурацию для peer connection
pub fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    let ice_servers = if servers.is_empty() {
        get_user_ice_servers(&default_ice_servers())
    } else {
        get_user_ice_servers(servers)
    };

    RTCConfiguration {
        ice_servers,
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(username: Option<&str>) -> ServerConfig {
        ServerConfig {
            id: "office".into(),
            r#type: "turn".into(),
            url: "turn.example.org:3478".into(),
            username: username.map(Into::into),
            credential: username.map(|_| "secret".into()),
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(validate_ice_servers(&default_ice_servers()).is_ok());
    }

    #[test]
    fn turn_needs_credentials() {
        assert!(validate_ice_servers(&[turn(None)]).is_err());
        assert!(validate_ice_servers(&[turn(Some("user"))]).is_ok());
    }

    #[test]
    fn unknown_type_and_empty_url_rejected() {
        let mut s = turn(Some("user"));
        s.r#type = "relay".into();
        assert!(matches!(
            validate_ice_servers(&[s]),
            Err(PadError::InvalidIceServer(_))
        ));

        let mut s = default_ice_servers().remove(0);
        s.url = "  ".into();
        assert!(validate_ice_servers(&[s]).is_err());
    }

    #[test]
    fn rtc_config_maps_servers() {
        let cfg = rtc_config(&[turn(Some("user"))]);
        assert_eq!(cfg.ice_servers.len(), 1);
        assert_eq!(cfg.ice_servers[0].urls, vec!["turn:turn.example.org:3478"]);
        assert_eq!(cfg.ice_servers[0].username, "user");
        assert_eq!(cfg.ice_servers[0].credential, "secret");
    }

    #[test]
    fn empty_list_falls_back_to_defaults() {
        let cfg = rtc_config(&[]);
        assert_eq!(cfg.ice_servers.len(), 2);
        assert_eq!(cfg.ice_candidate_pool_size, 10);
    }
}

//! Proxy configuration payloads.
//!
//! Two JSON documents are generated from the same settings: the server
//! config mounted into the relay container, and the client config handed
//! to the locally supervised process. Both follow the v2ray config schema.

use crate::error::Result;
use azrelay_cloud::ProvisionedEndpoint;
use azrelay_config::{RoutingConfig, Settings};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ProxyConfig {
    pub inbounds: Vec<Inbound>,
    pub outbounds: Vec<Outbound>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<Routing>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbound {
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_settings: Option<StreamSettings>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outbound {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_settings: Option<StreamSettings>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    pub network: String,
    pub ws_settings: WsSettings,
}

#[derive(Debug, Serialize)]
pub struct WsSettings {
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Routing {
    pub domain_strategy: String,
    pub rules: Vec<RoutingRule>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    pub outbound_tag: String,
}

fn websocket(path: &str) -> StreamSettings {
    StreamSettings {
        network: "ws".to_string(),
        ws_settings: WsSettings { path: path.to_string() },
    }
}

fn vmess_account(user_id: Uuid) -> serde_json::Value {
    serde_json::json!({ "id": user_id.to_string(), "alterId": 0 })
}

/// The config the relay container runs with: a single vmess-over-websocket
/// inbound and a pass-through outbound.
pub fn server_config(settings: &Settings) -> ProxyConfig {
    ProxyConfig {
        inbounds: vec![Inbound {
            port: settings.proxy_port,
            listen: None,
            protocol: "vmess".to_string(),
            settings: Some(serde_json::json!({
                "clients": [vmess_account(settings.user_id)],
            })),
            stream_settings: Some(websocket(&settings.ws_path)),
        }],
        outbounds: vec![Outbound {
            tag: None,
            protocol: "freedom".to_string(),
            settings: None,
            stream_settings: None,
        }],
        routing: None,
    }
}

pub fn server_config_bytes(settings: &Settings) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&server_config(settings))?)
}

/// The config the local process runs with: loopback socks and http
/// inbounds, a vmess outbound to the relay, and routing that sends explicit
/// domains and everything unmatched through the relay while private ranges
/// go direct.
pub fn client_config(
    settings: &Settings,
    routing: &RoutingConfig,
    endpoint: &ProvisionedEndpoint,
) -> ProxyConfig {
    let mut rules = Vec::with_capacity(3);
    if !routing.domains().is_empty() {
        rules.push(RoutingRule {
            rule_type: "field".to_string(),
            domain: Some(routing.domains().iter().map(|d| normalize_domain_rule(d)).collect()),
            ip: None,
            network: None,
            outbound_tag: "proxy".to_string(),
        });
    }
    rules.push(RoutingRule {
        rule_type: "field".to_string(),
        domain: None,
        ip: Some(vec!["geoip:private".to_string()]),
        network: None,
        outbound_tag: "direct".to_string(),
    });
    rules.push(RoutingRule {
        rule_type: "field".to_string(),
        domain: None,
        ip: None,
        network: Some("tcp,udp".to_string()),
        outbound_tag: "proxy".to_string(),
    });

    ProxyConfig {
        inbounds: vec![
            Inbound {
                port: settings.socks_port,
                listen: Some("127.0.0.1".to_string()),
                protocol: "socks".to_string(),
                settings: Some(serde_json::json!({ "udp": true })),
                stream_settings: None,
            },
            Inbound {
                port: settings.http_port,
                listen: Some("127.0.0.1".to_string()),
                protocol: "http".to_string(),
                settings: None,
                stream_settings: None,
            },
        ],
        outbounds: vec![
            Outbound {
                tag: Some("proxy".to_string()),
                protocol: "vmess".to_string(),
                settings: Some(serde_json::json!({
                    "vnext": [{
                        "address": endpoint.address,
                        "port": endpoint.port,
                        "users": [vmess_account(endpoint.user_id)],
                    }],
                })),
                stream_settings: Some(websocket(&settings.ws_path)),
            },
            Outbound {
                tag: Some("direct".to_string()),
                protocol: "freedom".to_string(),
                settings: None,
                stream_settings: None,
            },
        ],
        routing: Some(Routing {
            domain_strategy: "IPIfNonMatch".to_string(),
            rules,
        }),
    }
}

pub fn client_config_bytes(
    settings: &Settings,
    routing: &RoutingConfig,
    endpoint: &ProvisionedEndpoint,
) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&client_config(settings, routing, endpoint))?)
}

// Bare domains get the subdomain-matching prefix; entries that already
// carry a matcher prefix pass through untouched.
fn normalize_domain_rule(domain: &str) -> String {
    const MATCHER_PREFIXES: [&str; 4] = ["domain:", "full:", "regexp:", "geosite:"];
    if MATCHER_PREFIXES.iter().any(|p| domain.starts_with(p)) {
        domain.to_string()
    } else {
        format!("domain:{domain}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_UUID: &str = "f5a3e6d1-4b2c-4e8f-9a7b-1c2d3e4f5a6b";

    fn test_settings() -> Settings {
        temp_env::with_vars(
            [
                ("AZURE_TENANT_ID", Some("tenant")),
                ("AZURE_CLIENT_ID", Some("client")),
                ("AZURE_CLIENT_SECRET", Some("secret")),
                ("AZURE_SUBSCRIPTION_ID", Some("sub")),
                ("V2RAY_USER_ID", Some(TEST_UUID)),
            ],
            || Settings::from_env().unwrap(),
        )
    }

    fn test_endpoint() -> ProvisionedEndpoint {
        ProvisionedEndpoint {
            address: "20.1.2.3".to_string(),
            port: 443,
            user_id: TEST_UUID.parse().unwrap(),
        }
    }

    #[test]
    fn server_config_has_single_vmess_inbound() {
        let value = serde_json::to_value(server_config(&test_settings())).unwrap();
        assert_eq!(value["inbounds"][0]["protocol"], "vmess");
        assert_eq!(value["inbounds"][0]["port"], 443);
        assert_eq!(value["inbounds"][0]["streamSettings"]["network"], "ws");
        assert_eq!(value["inbounds"][0]["settings"]["clients"][0]["id"], TEST_UUID);
        assert_eq!(value["outbounds"][0]["protocol"], "freedom");
        assert!(value.get("routing").is_none());
    }

    #[test]
    fn client_config_routes_in_order() {
        let settings = test_settings();
        let routing = RoutingConfig::baseline();
        let value =
            serde_json::to_value(client_config(&settings, &routing, &test_endpoint())).unwrap();

        let rules = value["routing"]["rules"].as_array().unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0]["outboundTag"], "proxy");
        assert!(rules[0]["domain"].as_array().unwrap().len() >= 20);
        assert_eq!(rules[1]["ip"][0], "geoip:private");
        assert_eq!(rules[1]["outboundTag"], "direct");
        assert_eq!(rules[2]["network"], "tcp,udp");
        assert_eq!(rules[2]["outboundTag"], "proxy");
    }

    #[test]
    fn client_config_points_at_the_endpoint() {
        let settings = test_settings();
        let routing = RoutingConfig::baseline();
        let value =
            serde_json::to_value(client_config(&settings, &routing, &test_endpoint())).unwrap();

        let vnext = &value["outbounds"][0]["settings"]["vnext"][0];
        assert_eq!(vnext["address"], "20.1.2.3");
        assert_eq!(vnext["port"], 443);
        assert_eq!(vnext["users"][0]["id"], TEST_UUID);
        assert_eq!(value["inbounds"][0]["port"], 1080);
        assert_eq!(value["inbounds"][1]["port"], 1081);
    }

    #[test]
    fn bare_domains_get_the_matcher_prefix() {
        assert_eq!(normalize_domain_rule("example.com"), "domain:example.com");
        assert_eq!(normalize_domain_rule("geosite:google"), "geosite:google");
        assert_eq!(normalize_domain_rule("full:cdn.example.com"), "full:cdn.example.com");
    }
}

//! Azure REST implementation of [`ControlPlane`].
//!
//! Management-plane calls go through Azure Resource Manager with an OAuth2
//! client-credentials token; file-share data-plane calls are signed with the
//! storage account's SharedKey. No Azure SDK is involved, the surface azrelay
//! needs is four resource types and a handful of verbs.

use crate::backoff::BackoffPolicy;
use crate::client::{
    ContainerGroup, ContainerGroupSpec, ControlPlane, FileShare, ProvisioningState, ResourceGroup,
    ShareFileLocation, StorageAccount,
};
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

const ARM_BASE: &str = "https://management.azure.com";
const LOGIN_BASE: &str = "https://login.microsoftonline.com";
const FILE_SERVICE_SUFFIX: &str = "file.core.windows.net";

const RESOURCE_API: &str = "2021-04-01";
const STORAGE_API: &str = "2023-01-01";
const CONTAINER_API: &str = "2023-05-01";
const FILE_DATA_API: &str = "2022-11-02";

/// Share name used only for the readiness probe; it is never created, a
/// NotFound answer is the point.
const PROBE_SHARE: &str = "azrelay-readiness-probe";

/// Refresh tokens a minute before their actual expiry.
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(60);

type HmacSha256 = Hmac<Sha256>;

/// Service-principal credentials for the target subscription.
#[derive(Debug, Clone)]
pub struct AzureCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: String,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// ARM + file-service REST client.
pub struct AzureClient {
    http: reqwest::Client,
    credentials: AzureCredentials,
    token: Mutex<Option<CachedToken>>,
    poll: BackoffPolicy,
}

impl AzureClient {
    pub fn new(credentials: AzureCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            token: Mutex::new(None),
            poll: BackoffPolicy::storage_provisioning(),
        }
    }

    /// Bearer token for ARM, cached until shortly before expiry.
    async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("requesting new management-plane token");
        let url = format!(
            "{LOGIN_BASE}/{}/oauth2/v2.0/token",
            self.credentials.tenant_id
        );
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("scope", "https://management.azure.com/.default"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Token(format!("status {status}: {body}")));
        }

        #[derive(Deserialize)]
        struct TokenWire {
            access_token: String,
            expires_in: u64,
        }

        let wire: TokenWire = response.json().await?;
        let access_token = wire.access_token.clone();
        *cached = Some(CachedToken {
            access_token: wire.access_token,
            expires_at: Instant::now() + Duration::from_secs(wire.expires_in)
                - TOKEN_EXPIRY_SLACK,
        });
        Ok(access_token)
    }

    fn subscription_url(&self, suffix: &str, api_version: &str) -> String {
        format!(
            "{ARM_BASE}/subscriptions/{}{suffix}?api-version={api_version}",
            self.credentials.subscription_id
        )
    }

    async fn arm_request(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<serde_json::Value>,
        context: &str,
    ) -> Result<Option<serde_json::Value>> {
        let token = self.bearer_token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if let Some(err) = map_status(status, context) {
            let message = response.text().await.unwrap_or_default();
            return Err(attach_body(err, message));
        }

        if status == 204 {
            return Ok(None);
        }
        let text = response.text().await?;
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn arm_get<T: serde::de::DeserializeOwned>(&self, url: &str, context: &str) -> Result<T> {
        let value = self
            .arm_request(reqwest::Method::GET, url, None, context)
            .await?
            .ok_or_else(|| CloudError::Api {
                status: 200,
                message: format!("empty response for {context}"),
            })?;
        Ok(serde_json::from_value(value)?)
    }

    /// Signed request against the account's file service.
    async fn file_request(
        &self,
        verb: reqwest::Method,
        account: &str,
        key: &str,
        canonical_path: &str,
        query: &[(&str, &str)],
        extra_headers: &[(&str, String)],
        body: Option<Vec<u8>>,
        context: &str,
    ) -> Result<Vec<u8>> {
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();

        let mut ms_headers: BTreeMap<String, String> = BTreeMap::new();
        ms_headers.insert("x-ms-date".into(), date);
        ms_headers.insert("x-ms-version".into(), FILE_DATA_API.into());
        for (name, value) in extra_headers {
            ms_headers.insert((*name).to_string(), value.clone());
        }

        let content_length = body.as_ref().map(|b| b.len()).unwrap_or(0);
        let canonical_resource = canonicalized_resource(account, canonical_path, query);
        let signature = shared_key_signature(
            key,
            verb.as_str(),
            content_length,
            &canonical_resource,
            &ms_headers,
        )?;

        let mut url = format!("https://{account}.{FILE_SERVICE_SUFFIX}{canonical_path}");
        if !query.is_empty() {
            let joined: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
            url = format!("{url}?{}", joined.join("&"));
        }

        let mut request = self
            .http
            .request(verb, &url)
            .header("Authorization", format!("SharedKey {account}:{signature}"));
        for (name, value) in &ms_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.header("Content-Length", content_length).body(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if let Some(err) = map_status(status, context) {
            let message = response.text().await.unwrap_or_default();
            return Err(attach_body(err, message));
        }
        Ok(response.bytes().await?.to_vec())
    }

    fn container_group_body(&self, spec: &ContainerGroupSpec) -> serde_json::Value {
        serde_json::json!({
            "location": spec.location,
            "properties": {
                "containers": [{
                    "name": spec.name,
                    "properties": {
                        "image": spec.image,
                        "resources": { "requests": { "cpu": 1, "memoryInGB": 1 } },
                        "ports": [{ "port": spec.port, "protocol": "TCP" }],
                        "volumeMounts": [{
                            "name": "proxy-config",
                            "mountPath": spec.mount_path,
                            "readOnly": true
                        }],
                        "command": spec.command,
                    }
                }],
                "osType": "Linux",
                "restartPolicy": "Always",
                "ipAddress": {
                    "type": "Public",
                    "ports": [{ "port": spec.port, "protocol": "TCP" }],
                    "dnsNameLabel": spec.dns_label,
                },
                "volumes": [{
                    "name": "proxy-config",
                    "azureFile": {
                        "shareName": spec.share_name,
                        "storageAccountName": spec.storage_account,
                        "storageAccountKey": spec.storage_key,
                        "readOnly": true
                    }
                }]
            }
        })
    }
}

#[async_trait]
impl ControlPlane for AzureClient {
    async fn get_resource_group(&self, name: &str) -> Result<ResourceGroup> {
        let url = self.subscription_url(&format!("/resourceGroups/{name}"), RESOURCE_API);
        let wire: ResourceGroupWire = self.arm_get(&url, name).await?;
        Ok(ResourceGroup {
            name: wire.name,
            location: wire.location,
        })
    }

    async fn create_resource_group(&self, name: &str, location: &str) -> Result<()> {
        let url = self.subscription_url(&format!("/resourceGroups/{name}"), RESOURCE_API);
        self.arm_request(
            reqwest::Method::PUT,
            &url,
            Some(serde_json::json!({ "location": location })),
            name,
        )
        .await?;
        Ok(())
    }

    async fn get_storage_account(&self, group: &str, name: &str) -> Result<StorageAccount> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{group}/providers/Microsoft.Storage/storageAccounts/{name}"
            ),
            STORAGE_API,
        );
        let wire: StorageAccountWire = self.arm_get(&url, name).await?;
        Ok(StorageAccount {
            name: wire.name,
            location: wire.location,
            provisioning_state: ProvisioningState::parse(
                wire.properties.provisioning_state.as_deref().unwrap_or("Creating"),
            ),
        })
    }

    async fn create_storage_account(&self, group: &str, name: &str, location: &str) -> Result<()> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{group}/providers/Microsoft.Storage/storageAccounts/{name}"
            ),
            STORAGE_API,
        );
        let body = serde_json::json!({
            "location": location,
            "sku": { "name": "Standard_LRS" },
            "kind": "StorageV2",
            "properties": {
                "encryption": {
                    "services": { "file": { "enabled": true } },
                    "keySource": "Microsoft.Storage"
                }
            }
        });
        self.arm_request(reqwest::Method::PUT, &url, Some(body), name).await?;
        Ok(())
    }

    async fn list_storage_keys(&self, group: &str, name: &str) -> Result<Vec<String>> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{group}/providers/Microsoft.Storage/storageAccounts/{name}/listKeys"
            ),
            STORAGE_API,
        );
        let value = self
            .arm_request(reqwest::Method::POST, &url, None, name)
            .await?
            .ok_or_else(|| CloudError::Api {
                status: 200,
                message: format!("empty listKeys response for {name}"),
            })?;
        let wire: ListKeysWire = serde_json::from_value(value)?;
        Ok(wire.keys.into_iter().map(|k| k.value).collect())
    }

    async fn probe_file_service(&self, account: &str, key: &str) -> Result<()> {
        self.file_request(
            reqwest::Method::GET,
            account,
            key,
            &format!("/{PROBE_SHARE}"),
            &[("restype", "share")],
            &[],
            None,
            PROBE_SHARE,
        )
        .await?;
        Ok(())
    }

    async fn get_file_share(&self, group: &str, account: &str, share: &str) -> Result<FileShare> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{group}/providers/Microsoft.Storage/storageAccounts/{account}/fileServices/default/shares/{share}"
            ),
            STORAGE_API,
        );
        let wire: FileShareWire = self.arm_get(&url, share).await?;
        Ok(FileShare {
            name: wire.name,
            quota_gb: wire.properties.share_quota.unwrap_or(0),
        })
    }

    async fn create_file_share(
        &self,
        group: &str,
        account: &str,
        share: &str,
        quota_gb: u32,
    ) -> Result<()> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{group}/providers/Microsoft.Storage/storageAccounts/{account}/fileServices/default/shares/{share}"
            ),
            STORAGE_API,
        );
        let body = serde_json::json!({ "properties": { "shareQuota": quota_gb } });
        self.arm_request(reqwest::Method::PUT, &url, Some(body), share).await?;
        Ok(())
    }

    async fn download_file(&self, loc: &ShareFileLocation<'_>) -> Result<Vec<u8>> {
        self.file_request(
            reqwest::Method::GET,
            loc.account,
            loc.key,
            &format!("/{}/{}", loc.share, loc.path),
            &[],
            &[],
            None,
            loc.path,
        )
        .await
    }

    async fn upload_file(&self, loc: &ShareFileLocation<'_>, contents: &[u8]) -> Result<()> {
        let path = format!("/{}/{}", loc.share, loc.path);

        // Azure Files uploads are two-step: create (or truncate) the file,
        // then write the single range.
        self.file_request(
            reqwest::Method::PUT,
            loc.account,
            loc.key,
            &path,
            &[],
            &[
                ("x-ms-type", "file".to_string()),
                ("x-ms-content-length", contents.len().to_string()),
            ],
            None,
            loc.path,
        )
        .await?;

        // A zero-length file is fully described by the create step and
        // admits no valid byte range.
        let Some(range) = upload_range(contents.len()) else {
            return Ok(());
        };
        self.file_request(
            reqwest::Method::PUT,
            loc.account,
            loc.key,
            &path,
            &[("comp", "range")],
            &[("x-ms-write", "update".to_string()), ("x-ms-range", range)],
            Some(contents.to_vec()),
            loc.path,
        )
        .await?;
        Ok(())
    }

    async fn list_container_groups(&self, group: &str) -> Result<Vec<ContainerGroup>> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{group}/providers/Microsoft.ContainerInstance/containerGroups"
            ),
            CONTAINER_API,
        );
        let wire: ListWire<ContainerGroupWire> = self.arm_get(&url, group).await?;
        Ok(wire.value.into_iter().map(ContainerGroup::from).collect())
    }

    async fn get_container_group(&self, group: &str, name: &str) -> Result<ContainerGroup> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{group}/providers/Microsoft.ContainerInstance/containerGroups/{name}"
            ),
            CONTAINER_API,
        );
        let wire: ContainerGroupWire = self.arm_get(&url, name).await?;
        Ok(wire.into())
    }

    async fn create_container_group(
        &self,
        group: &str,
        spec: &ContainerGroupSpec,
    ) -> Result<ContainerGroup> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{group}/providers/Microsoft.ContainerInstance/containerGroups/{}",
                spec.name
            ),
            CONTAINER_API,
        );
        self.arm_request(
            reqwest::Method::PUT,
            &url,
            Some(self.container_group_body(spec)),
            &spec.name,
        )
        .await?;

        // The PUT is accepted long before the group is usable; poll until the
        // provisioning state is terminal.
        let group_name = group.to_string();
        let name = spec.name.clone();
        self.poll
            .wait_until("container group provisioning", || {
                let group_name = group_name.clone();
                let name = name.clone();
                async move {
                    let url = self.subscription_url(
                        &format!(
                            "/resourceGroups/{group_name}/providers/Microsoft.ContainerInstance/containerGroups/{name}"
                        ),
                        CONTAINER_API,
                    );
                    let wire: ContainerGroupWire = self.arm_get(&url, &name).await?;
                    let state = wire.properties.provisioning_state.as_deref().unwrap_or("");
                    match ProvisioningState::parse(state) {
                        ProvisioningState::Succeeded => Ok(true),
                        ProvisioningState::Failed => Err(CloudError::Api {
                            status: 200,
                            message: format!("container group {name} failed to provision"),
                        }),
                        _ => Ok(false),
                    }
                }
            })
            .await?;

        let created = self.get_container_group(group, &spec.name).await?;
        info!(
            name = created.name,
            ip = created.ip.as_deref().unwrap_or("-"),
            fqdn = created.fqdn.as_deref().unwrap_or("-"),
            "container group provisioned"
        );
        Ok(created)
    }

    async fn delete_container_group(&self, group: &str, name: &str) -> Result<()> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{group}/providers/Microsoft.ContainerInstance/containerGroups/{name}"
            ),
            CONTAINER_API,
        );
        self.arm_request(reqwest::Method::DELETE, &url, None, name).await?;
        Ok(())
    }

    async fn restart_container_group(&self, group: &str, name: &str) -> Result<()> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{group}/providers/Microsoft.ContainerInstance/containerGroups/{name}/restart"
            ),
            CONTAINER_API,
        );
        self.arm_request(reqwest::Method::POST, &url, None, name).await?;
        Ok(())
    }

    async fn start_container_group(&self, group: &str, name: &str) -> Result<()> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{group}/providers/Microsoft.ContainerInstance/containerGroups/{name}/start"
            ),
            CONTAINER_API,
        );
        self.arm_request(reqwest::Method::POST, &url, None, name).await?;
        Ok(())
    }
}

/// Map an HTTP status to the error taxonomy; `None` means success.
fn map_status(status: u16, context: &str) -> Option<CloudError> {
    match status {
        200..=299 => None,
        404 => Some(CloudError::NotFound(context.to_string())),
        409 => Some(CloudError::AlreadyExists(context.to_string())),
        401 | 403 => Some(CloudError::Auth(context.to_string())),
        _ => Some(CloudError::Api {
            status,
            message: context.to_string(),
        }),
    }
}

/// Fold the response body into the mapped error where it adds detail.
fn attach_body(err: CloudError, body: String) -> CloudError {
    if body.is_empty() {
        return err;
    }
    match err {
        CloudError::Api { status, message } => CloudError::Api {
            status,
            message: format!("{message}: {body}"),
        },
        CloudError::Auth(context) => CloudError::Auth(format!("{context}: {body}")),
        other => other,
    }
}

/// Range header for a single write covering `len` bytes from offset zero.
/// `None` for an empty payload, which has no representable range.
fn upload_range(len: usize) -> Option<String> {
    len.checked_sub(1).map(|end| format!("bytes=0-{end}"))
}

fn canonicalized_resource(account: &str, path: &str, query: &[(&str, &str)]) -> String {
    let mut resource = format!("/{account}{path}");
    let mut params: Vec<(&str, &str)> = query.to_vec();
    params.sort();
    for (key, value) in params {
        resource.push_str(&format!("\n{key}:{value}"));
    }
    resource
}

/// SharedKey string-to-sign for the file service, 2015-02-21 and later rules:
/// empty Content-Length when there is no body.
fn shared_key_signature(
    key: &str,
    verb: &str,
    content_length: usize,
    canonical_resource: &str,
    ms_headers: &BTreeMap<String, String>,
) -> Result<String> {
    let length_field = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let canonical_headers: String = ms_headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();

    let string_to_sign = format!(
        "{verb}\n\n\n{length_field}\n\n\n\n\n\n\n\n\n{canonical_headers}{canonical_resource}"
    );

    let key_bytes = BASE64
        .decode(key)
        .map_err(|_| CloudError::Auth("storage key is not valid base64".to_string()))?;
    let mut mac = HmacSha256::new_from_slice(&key_bytes)
        .map_err(|_| CloudError::Auth("storage key has an invalid length".to_string()))?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[derive(Deserialize)]
struct ResourceGroupWire {
    name: String,
    location: String,
}

#[derive(Deserialize)]
struct StorageAccountWire {
    name: String,
    location: String,
    #[serde(default)]
    properties: StoragePropsWire,
}

#[derive(Deserialize, Default)]
struct StoragePropsWire {
    #[serde(rename = "provisioningState")]
    provisioning_state: Option<String>,
}

#[derive(Deserialize)]
struct ListKeysWire {
    keys: Vec<KeyWire>,
}

#[derive(Deserialize)]
struct KeyWire {
    value: String,
}

#[derive(Deserialize)]
struct FileShareWire {
    name: String,
    #[serde(default)]
    properties: FileSharePropsWire,
}

#[derive(Deserialize, Default)]
struct FileSharePropsWire {
    #[serde(rename = "shareQuota")]
    share_quota: Option<u32>,
}

#[derive(Deserialize)]
struct ListWire<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
struct ContainerGroupWire {
    name: String,
    location: String,
    #[serde(default)]
    properties: ContainerGroupPropsWire,
}

#[derive(Deserialize, Default)]
struct ContainerGroupPropsWire {
    #[serde(rename = "provisioningState")]
    provisioning_state: Option<String>,
    #[serde(rename = "ipAddress")]
    ip_address: Option<IpAddressWire>,
    #[serde(rename = "instanceView")]
    instance_view: Option<InstanceViewWire>,
}

#[derive(Deserialize)]
struct IpAddressWire {
    ip: Option<String>,
    fqdn: Option<String>,
}

#[derive(Deserialize)]
struct InstanceViewWire {
    state: Option<String>,
}

impl From<ContainerGroupWire> for ContainerGroup {
    fn from(wire: ContainerGroupWire) -> Self {
        ContainerGroup {
            name: wire.name,
            location: wire.location,
            state: wire.properties.instance_view.and_then(|v| v.state),
            ip: wire.properties.ip_address.as_ref().and_then(|a| a.ip.clone()),
            fqdn: wire.properties.ip_address.as_ref().and_then(|a| a.fqdn.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert!(map_status(200, "x").is_none());
        assert!(map_status(202, "x").is_none());
        assert!(matches!(map_status(404, "x"), Some(CloudError::NotFound(_))));
        assert!(matches!(map_status(409, "x"), Some(CloudError::AlreadyExists(_))));
        assert!(matches!(map_status(403, "x"), Some(CloudError::Auth(_))));
        assert!(matches!(
            map_status(500, "x"),
            Some(CloudError::Api { status: 500, .. })
        ));
    }

    #[test]
    fn canonical_resource_sorts_query_params() {
        let resource = canonicalized_resource(
            "acct",
            "/share/config.json",
            &[("restype", "share"), ("comp", "range")],
        );
        assert_eq!(resource, "/acct/share/config.json\ncomp:range\nrestype:share");
    }

    #[test]
    fn upload_range_covers_the_payload_and_skips_empty() {
        assert_eq!(upload_range(0), None);
        assert_eq!(upload_range(1).as_deref(), Some("bytes=0-0"));
        assert_eq!(upload_range(4096).as_deref(), Some("bytes=0-4095"));
    }

    #[test]
    fn signature_is_deterministic_and_verb_sensitive() {
        let key = BASE64.encode(b"0123456789abcdef0123456789abcdef");
        let mut headers = BTreeMap::new();
        headers.insert("x-ms-date".to_string(), "Mon, 01 Jan 2024 00:00:00 GMT".to_string());
        headers.insert("x-ms-version".to_string(), FILE_DATA_API.to_string());

        let a = shared_key_signature(&key, "GET", 0, "/acct/share", &headers).unwrap();
        let b = shared_key_signature(&key, "GET", 0, "/acct/share", &headers).unwrap();
        let c = shared_key_signature(&key, "PUT", 0, "/acct/share", &headers).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn zero_content_length_signs_as_empty_field() {
        let key = BASE64.encode(b"0123456789abcdef0123456789abcdef");
        let headers = BTreeMap::new();
        let with_body = shared_key_signature(&key, "PUT", 42, "/acct/share", &headers).unwrap();
        let without_body = shared_key_signature(&key, "PUT", 0, "/acct/share", &headers).unwrap();
        assert_ne!(with_body, without_body);
    }

    #[test]
    fn invalid_storage_key_is_an_auth_error() {
        let headers = BTreeMap::new();
        let result = shared_key_signature("no€t-base64!", "GET", 0, "/acct/share", &headers);
        assert!(matches!(result, Err(CloudError::Auth(_))));
    }

    #[test]
    fn container_group_wire_conversion() {
        let wire: ContainerGroupWire = serde_json::from_value(serde_json::json!({
            "name": "azrelay-00000001",
            "location": "southeastasia",
            "properties": {
                "provisioningState": "Succeeded",
                "ipAddress": { "ip": "20.0.0.1", "fqdn": "azrelay.example.io" },
                "instanceView": { "state": "Running" }
            }
        }))
        .unwrap();

        let group: ContainerGroup = wire.into();
        assert!(group.is_running());
        assert_eq!(group.address(), Some("20.0.0.1"));
    }
}

//! Deterministic in-process stand-in for a cloud provider API.
//!
//! Every response is derived from the account id, the region and the item
//! index, so repeated runs produce identical inventories.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collectors::Page;

/// Shape of the simulated inventory and its failure knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedProfile {
    pub vm_count: u32,
    pub bucket_count: u32,
    pub user_count: u32,
    pub event_count: u32,
    /// Delay added to every API call.
    pub latency: Duration,
    /// Regions bucket home locations cycle through.
    pub regions: Vec<String>,
    /// Resource types whose client initialization fails.
    pub fail_init_for: Vec<String>,
    /// Secret key that the credential check rejects.
    pub reject_secret: String,
}

impl Default for SimulatedProfile {
    fn default() -> Self {
        Self {
            vm_count: 120,
            bucket_count: 12,
            user_count: 25,
            event_count: 10,
            latency: Duration::from_millis(2),
            regions: vec![
                "sim-east-1".to_string(),
                "sim-west-1".to_string(),
                "sim-central-1".to_string(),
            ],
            fail_init_for: Vec::new(),
            reject_secret: "invalid".to_string(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimulatedError {
    #[error("PermanentRedirect: bucket must be addressed at endpoint {endpoint}")]
    WrongEndpoint { endpoint: String },
    #[error("{code}: {message}")]
    Service { code: String, message: String },
}

impl SimulatedError {
    fn service(code: &str, message: impl Into<String>) -> Self {
        SimulatedError::Service {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Endpoint named in a redirect, used for corrective retries.
    pub fn redirect_endpoint(&self) -> Option<String> {
        match self {
            SimulatedError::WrongEndpoint { endpoint } => Some(endpoint.clone()),
            SimulatedError::Service { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub state: String,
    pub private_ip: String,
    pub index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Disk {
    pub id: String,
    pub size_gb: u32,
    pub encrypted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bucket {
    pub name: String,
    pub location: String,
    pub created: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub user_id: String,
    pub user_name: String,
    pub index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessKey {
    pub access_key_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub event_id: String,
    pub event_name: String,
    pub source_ip: String,
}

/// Client scoped to one account and region.
#[derive(Debug, Clone)]
pub struct SimulatedApi {
    account_id: String,
    region: String,
    profile: Arc<SimulatedProfile>,
}

impl SimulatedApi {
    pub fn new(account_id: &str, region: &str, profile: Arc<SimulatedProfile>) -> Self {
        Self {
            account_id: account_id.to_string(),
            region: region.to_string(),
            profile,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn call(&self) {
        if self.profile.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.profile.latency).await;
        }
    }

    fn seed(&self, kind: &str, index: u32) -> u32 {
        // FNV-1a over the identifying parts
        let mut hash: u32 = 0x811c_9dc5;
        for byte in self
            .account_id
            .bytes()
            .chain(self.region.bytes())
            .chain(kind.bytes())
            .chain(index.to_le_bytes())
        {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(0x0100_0193);
        }
        hash
    }

    /// Page-number listing that reports the total.
    pub async fn list_instances(&self, page: u32, size: u32) -> Result<Page<Instance>, SimulatedError> {
        self.call().await;
        let total = self.profile.vm_count;
        let start = page.saturating_sub(1).saturating_mul(size).min(total);
        let end = start.saturating_add(size).min(total);
        let items = (start..end)
            .map(|i| {
                let seed = self.seed("vm", i);
                Instance {
                    id: format!("i-{:08x}", seed),
                    name: format!("vm-{}-{:04}", self.region, i),
                    state: if seed % 5 == 0 { "stopped" } else { "running" }.to_string(),
                    private_ip: format!("10.{}.{}.{}", seed % 256, (seed >> 8) % 256, (i % 250) + 2),
                    index: i,
                }
            })
            .collect();
        Ok(Page::new(items).with_total(total as u64))
    }

    /// Fails for every seventh instance.
    pub async fn describe_disks(&self, instance: &Instance) -> Result<Vec<Disk>, SimulatedError> {
        self.call().await;
        if instance.index % 7 == 0 {
            return Err(SimulatedError::service(
                "AccessDenied",
                format!("not authorized to describe volumes of {}", instance.id),
            ));
        }
        let seed = self.seed("disk", instance.index);
        Ok((0..(seed % 3 + 1))
            .map(|d| Disk {
                id: format!("vol-{:08x}{}", seed, d),
                size_gb: 8 << (d + seed % 4),
                encrypted: (seed + d) % 2 == 0,
            })
            .collect())
    }

    /// Unpaged listing of every bucket of the account.
    pub async fn list_buckets(&self) -> Result<Vec<Bucket>, SimulatedError> {
        self.call().await;
        let regions = &self.profile.regions;
        Ok((0..self.profile.bucket_count)
            .map(|i| Bucket {
                name: format!("bucket-{}-{:03}", self.account_id, i),
                location: regions
                    .get(i as usize % regions.len().max(1))
                    .cloned()
                    .unwrap_or_else(|| self.region.clone()),
                created: format!("2024-01-{:02}T00:00:00Z", i % 28 + 1),
            })
            .collect())
    }

    /// Redirects when `endpoint` is not the bucket's home region.
    pub async fn get_bucket_policy(&self, endpoint: &str, bucket: &Bucket) -> Result<String, SimulatedError> {
        self.call().await;
        if endpoint != bucket.location {
            return Err(SimulatedError::WrongEndpoint {
                endpoint: bucket.location.clone(),
            });
        }
        if bucket.name.ends_with('0') || bucket.name.ends_with('5') {
            return Err(SimulatedError::service(
                "NoSuchBucketPolicy",
                "The bucket policy does not exist",
            ));
        }
        Ok(format!(
            "{{\"Version\":\"2012-10-17\",\"Statement\":[{{\"Effect\":\"Deny\",\"Resource\":\"{}\"}}]}}",
            bucket.name
        ))
    }

    /// Marker-paginated user listing without a total.
    pub async fn list_users(&self, marker: Option<&str>, max_items: u32) -> Result<Page<User>, SimulatedError> {
        self.call().await;
        let start = match marker {
            Some(m) => m
                .parse::<u32>()
                .map_err(|_| SimulatedError::service("InvalidInput", format!("bad marker {}", m)))?,
            None => 0,
        };
        let total = self.profile.user_count;
        let end = start.saturating_add(max_items).min(total);
        let items = (start..end)
            .map(|i| User {
                user_id: format!("AIDA{:012X}", self.seed("user", i)),
                user_name: format!("user-{:03}", i),
                index: i,
            })
            .collect();
        let next = (end < total).then(|| end.to_string());
        Ok(Page::new(items)
            .with_next_token(next.clone())
            .with_truncated(next.is_some()))
    }

    pub async fn list_access_keys(&self, user: &User) -> Result<Vec<AccessKey>, SimulatedError> {
        self.call().await;
        Ok((0..(user.index % 3))
            .map(|k| AccessKey {
                access_key_id: format!("AKIA{:012X}", self.seed("key", user.index * 10 + k)),
                status: if k == 0 { "Active" } else { "Inactive" }.to_string(),
            })
            .collect())
    }

    /// Missing for users with an odd index.
    pub async fn get_mfa_device(&self, user: &User) -> Result<String, SimulatedError> {
        self.call().await;
        if user.index % 2 == 1 {
            return Err(SimulatedError::service(
                "NoSuchEntity",
                format!("no MFA device for {}", user.user_name),
            ));
        }
        Ok(format!("arn:sim:iam::{}:mfa/{}", self.account_id, user.user_name))
    }

    /// Offset-paginated event listing without a total.
    pub async fn list_events(&self, offset: u64, limit: u32) -> Result<Page<AuditEvent>, SimulatedError> {
        self.call().await;
        let total = self.profile.event_count as u64;
        let start = offset.min(total);
        let end = start.saturating_add(limit as u64).min(total);
        let items = (start..end)
            .map(|i| {
                let seed = self.seed("event", i as u32);
                AuditEvent {
                    event_id: format!("evt-{:08x}", seed),
                    event_name: ["ConsoleLogin", "PutBucketPolicy", "CreateUser", "StopInstances"]
                        [(seed % 4) as usize]
                        .to_string(),
                    source_ip: format!("203.0.113.{}", seed % 250),
                }
            })
            .collect();
        Ok(Page::new(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> SimulatedApi {
        let profile = SimulatedProfile {
            latency: Duration::ZERO,
            ..Default::default()
        };
        SimulatedApi::new("000000000001", "sim-east-1", Arc::new(profile))
    }

    #[tokio::test]
    async fn test_listing_is_deterministic() {
        let a = api().list_instances(1, 10).await.unwrap();
        let b = api().list_instances(1, 10).await.unwrap();
        assert_eq!(a.items, b.items);
        assert_eq!(a.total, Some(120));

        let last = api().list_instances(3, 50).await.unwrap();
        assert_eq!(last.items.len(), 20);
    }

    #[tokio::test]
    async fn test_bucket_policy_redirects() {
        let api = api();
        let buckets = api.list_buckets().await.unwrap();
        let remote = buckets.iter().find(|b| b.location != "sim-east-1").unwrap();

        let err = api.get_bucket_policy("sim-east-1", remote).await.unwrap_err();
        assert_eq!(err.redirect_endpoint().as_deref(), Some(remote.location.as_str()));
    }

    #[tokio::test]
    async fn test_user_markers() {
        let api = api();
        let first = api.list_users(None, 10).await.unwrap();
        assert_eq!(first.next_token.as_deref(), Some("10"));
        let last = api.list_users(Some("20"), 10).await.unwrap();
        assert_eq!(last.items.len(), 5);
        assert!(last.next_token.is_none());
        assert_eq!(last.truncated, Some(false));
        assert!(api.list_users(Some("x"), 10).await.is_err());
    }
}

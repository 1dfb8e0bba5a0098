//! AWS provider built on rusoto.
//!
//! `AwsServices` only creates the clients a unit's resource type needs. The
//! collection trigger checks the account's credentials with STS before any
//! unit of the account is scheduled.

mod ec2;
mod iam;
mod s3;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use rusoto_core::{HttpClient, Region};
use rusoto_credential::{
    AwsCredentials, ChainProvider, CredentialsError, ProfileProvider, ProvideAwsCredentials, StaticProvider,
};
use rusoto_ec2::Ec2Client;
use rusoto_iam::IamClient;
use rusoto_s3::S3Client;
use rusoto_sts::{GetCallerIdentityRequest, Sts, StsClient};
use serde::Deserialize;

use crate::config::{CloudAccount, Credentials};
use crate::constants::{AWS_GLOBAL_REGION, PLATFORM_AWS};
use crate::error::CollectError;
use crate::models::CollectRecordInfo;
use crate::platform::{ClientBundle, CloudAccountParam, FieldPaths, PlatformConfig, ResourceDefinition};

pub use ec2::InstanceCollector;
pub use iam::UserCollector;
pub use s3::{redirect_region, BucketCollector};

pub const S3_BUCKET: &str = "S3 Bucket";
pub const IAM_USER: &str = "IAM User";
pub const EC2_INSTANCE: &str = "EC2 Instance";

const DEFAULT_REGIONS: [&str; 8] = [
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
    "ap-southeast-1",
    "ap-northeast-1",
];

/// Error codes that mean the account's keys will never work.
const INVALID_CREDENTIAL_CODES: [&str; 4] = [
    "InvalidClientTokenId",
    "SignatureDoesNotMatch",
    "InvalidAccessKeyId",
    "ExpiredToken",
];

/// Credentials handed to every rusoto client of one unit.
#[derive(Clone)]
pub enum CredentialSource {
    Static(StaticProvider),
    Chain(ChainProvider),
    Profile(ProfileProvider),
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            CredentialSource::Static(_) => "static",
            CredentialSource::Chain(_) => "chain",
            CredentialSource::Profile(_) => "profile",
        };
        write!(f, "CredentialSource({})", kind)
    }
}

#[derive(Deserialize)]
struct JsonCredentials {
    #[serde(alias = "AccessKeyId", alias = "accessKeyId")]
    access_key_id: String,
    #[serde(alias = "SecretAccessKey", alias = "secretAccessKey")]
    secret_access_key: String,
    #[serde(default, alias = "SessionToken", alias = "sessionToken")]
    session_token: Option<String>,
}

impl CredentialSource {
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let source = match credentials {
            Credentials::Ambient => CredentialSource::Chain(ChainProvider::new()),
            Credentials::AccessKey {
                access_key_id,
                secret_access_key,
                session_token,
            } => CredentialSource::Static(StaticProvider::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                session_token.clone(),
                None,
            )),
            Credentials::Json { credentials_json } => {
                let parsed: JsonCredentials =
                    serde_json::from_str(credentials_json).context("Failed to parse credentials JSON")?;
                CredentialSource::Static(StaticProvider::new(
                    parsed.access_key_id,
                    parsed.secret_access_key,
                    parsed.session_token,
                    None,
                ))
            }
            Credentials::Profile { profile } => {
                let mut provider = ProfileProvider::new().context("Failed to create AWS profile provider")?;
                provider.set_profile(profile.as_str());
                CredentialSource::Profile(provider)
            }
        };
        Ok(source)
    }
}

#[async_trait]
impl ProvideAwsCredentials for CredentialSource {
    async fn credentials(&self) -> Result<AwsCredentials, CredentialsError> {
        match self {
            CredentialSource::Static(p) => p.credentials().await,
            CredentialSource::Chain(p) => p.credentials().await,
            CredentialSource::Profile(p) => p.credentials().await,
        }
    }
}

fn parse_region(name: &str) -> Result<Region> {
    name.parse::<Region>()
        .map_err(|e| anyhow!("invalid AWS region '{}': {}", name, e))
}

/// Per-unit set of AWS clients.
#[derive(Clone, Default)]
pub struct AwsServices {
    region: Option<Region>,
    credentials: Option<CredentialSource>,
    s3: Option<S3Client>,
    /// S3 clients for buckets homed outside the unit's region, by region.
    s3_regional: Arc<Mutex<HashMap<String, S3Client>>>,
    iam: Option<IamClient>,
    ec2: Option<Ec2Client>,
}

impl AwsServices {
    fn credentials(&self) -> Result<&CredentialSource> {
        self.credentials
            .as_ref()
            .ok_or_else(|| anyhow!("AWS services not initialized"))
    }

    pub fn region_name(&self) -> &str {
        self.region.as_ref().map(|r| r.name()).unwrap_or(AWS_GLOBAL_REGION)
    }

    pub fn s3(&self) -> Result<&S3Client> {
        self.s3.as_ref().ok_or_else(|| anyhow!("S3 client not initialized"))
    }

    /// S3 client addressed at `region`. The unit's own client serves its
    /// region; clients for other regions are built once and reused.
    pub fn s3_for(&self, region: &str) -> Result<S3Client> {
        if region == self.region_name() {
            return self.s3().cloned();
        }
        let mut regional = self
            .s3_regional
            .lock()
            .map_err(|_| anyhow!("S3 client cache poisoned"))?;
        if let Some(client) = regional.get(region) {
            return Ok(client.clone());
        }
        let http = HttpClient::new().context("Failed to create HTTP client")?;
        let client = S3Client::new_with(http, self.credentials()?.clone(), parse_region(region)?);
        debug!("Created S3 client for {}", region);
        regional.insert(region.to_string(), client.clone());
        Ok(client)
    }

    #[cfg(test)]
    fn s3_regions_cached(&self) -> usize {
        self.s3_regional.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn iam(&self) -> Result<&IamClient> {
        self.iam.as_ref().ok_or_else(|| anyhow!("IAM client not initialized"))
    }

    pub fn ec2(&self) -> Result<&Ec2Client> {
        self.ec2.as_ref().ok_or_else(|| anyhow!("EC2 client not initialized"))
    }
}

#[async_trait]
impl ClientBundle for AwsServices {
    async fn init_services(&mut self, param: &CloudAccountParam) -> Result<()> {
        let init_failed = |reason: String| CollectError::InitFailed {
            resource_type: param.resource_type.clone(),
            reason,
        };

        let region = parse_region(&param.region).map_err(|e| init_failed(e.to_string()))?;
        let credentials =
            CredentialSource::from_credentials(&param.credentials).map_err(|e| init_failed(format!("{:#}", e)))?;
        if let Some(proxy) = &param.proxy {
            warn!("{} proxy {} is not supported by this client, connecting directly", param, proxy);
        }
        let http = || HttpClient::new().map_err(|e| init_failed(e.to_string()));

        match param.resource_type.as_str() {
            S3_BUCKET => self.s3 = Some(S3Client::new_with(http()?, credentials.clone(), region.clone())),
            IAM_USER => self.iam = Some(IamClient::new_with(http()?, credentials.clone(), region.clone())),
            EC2_INSTANCE => self.ec2 = Some(Ec2Client::new_with(http()?, credentials.clone(), region.clone())),
            other => return Err(init_failed(format!("no client registered for {}", other)).into()),
        }
        debug!("{} client initialized", param);

        self.region = Some(region);
        self.credentials = Some(credentials);
        Ok(())
    }

    fn fresh(&self) -> Self {
        Self::default()
    }

    async fn assess_collection_trigger(&self, param: &CloudAccountParam) -> CollectRecordInfo {
        let enabled = CollectRecordInfo::enabled(&param.account_id, &param.platform);

        let client = match (
            CredentialSource::from_credentials(&param.credentials),
            HttpClient::new(),
            parse_region(&param.region),
        ) {
            (Ok(credentials), Ok(http), Ok(region)) => StsClient::new_with(http, credentials, region),
            (Err(e), _, _) => {
                return CollectRecordInfo::skipped(
                    &param.account_id,
                    &param.platform,
                    format!("unusable credentials: {:#}", e),
                )
            }
            _ => {
                warn!("{} could not build STS client, collecting without credential check", param);
                return enabled;
            }
        };

        match client.get_caller_identity(GetCallerIdentityRequest {}).await {
            Ok(identity) => {
                debug!("{} authenticated as {}", param, identity.arn.unwrap_or_default());
                enabled
            }
            Err(e) => {
                let message = e.to_string();
                if INVALID_CREDENTIAL_CODES.iter().any(|code| message.contains(code)) {
                    let mut record = CollectRecordInfo::skipped(&param.account_id, &param.platform, message.clone());
                    record.error_message = Some(message);
                    record
                } else {
                    warn!("{} credential check failed: {}", param, message);
                    enabled
                }
            }
        }
    }
}

/// The AWS platform: S3 buckets, IAM users and EC2 instances.
pub fn platform() -> Result<PlatformConfig<AwsServices>, CollectError> {
    let resources = vec![
        ResourceDefinition::new(S3_BUCKET, "storage", BucketCollector)
            .description("https://docs.aws.amazon.com/AmazonS3/latest/API/API_ListBuckets.html")
            .field_paths(FieldPaths::new("$.bucket.name", "$.bucket.name"))
            .global()
            .regions(&[AWS_GLOBAL_REGION]),
        ResourceDefinition::new(IAM_USER, "identity", UserCollector)
            .description("https://docs.aws.amazon.com/IAM/latest/APIReference/API_ListUsers.html")
            .field_paths(FieldPaths::new("$.user.user_id", "$.user.user_name"))
            .global()
            .regions(&[AWS_GLOBAL_REGION]),
        ResourceDefinition::new(EC2_INSTANCE, "compute", InstanceCollector)
            .description("https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_DescribeInstances.html")
            .field_paths(
                FieldPaths::new("$.instance_id", "$.name").with_address("$.private_ip_address"),
            ),
    ];
    let regions = DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect();
    let accounts = CloudAccount::from_env(PLATFORM_AWS).into_iter().collect();
    PlatformConfig::new(PLATFORM_AWS, resources, AwsServices::default(), regions, accounts)
}

//! AWS-backed implementations of the scheduling traits.
//!
//! Every client is built from an [`AccountProfile`] alone; the process
//! environment's credential chain is never consulted, so switching accounts
//! between invocations cannot leak one account's credentials into another's
//! requests.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_credential_types::provider::SharedCredentialsProvider;

use crate::config::AccountProfile;

mod directory;
mod error;
mod provision;
mod store;

pub use directory::Ec2Directory;
pub use error::AwsApiError;
pub use provision::IamLambdaProvisioner;
pub use store::EventBridgeRuleStore;

/// Builds the SDK configuration shared by every service client.
///
/// Assembled by hand rather than through `aws_config::defaults` so that only
/// the accounts file feeds the clients.
#[must_use]
pub fn shared_config(profile: &AccountProfile) -> SdkConfig {
    let credentials = Credentials::new(
        profile.access_key_id.clone(),
        profile.secret_access_key.clone(),
        None,
        None,
        "drowse-accounts-file",
    );
    SdkConfig::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(profile.region.clone()))
        .credentials_provider(SharedCredentialsProvider::new(credentials))
        .build()
}

/// ARN of the scheduler function in the profile's account and region.
#[must_use]
pub fn function_arn(profile: &AccountProfile, function_name: &str) -> String {
    format!(
        "arn:aws:lambda:{}:{}:function:{function_name}",
        profile.region, profile.account_id
    )
}

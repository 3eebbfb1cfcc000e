//! EC2-backed instance directory.

use aws_sdk_ec2::Client;
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::operation::describe_instances::DescribeInstancesError;
use aws_sdk_ec2::types::{Filter, Instance, Reservation};
use tracing::warn;

use crate::directory::{DirectoryError, DirectoryFuture, InstanceDirectory, InstanceRef};

const OPERATION: &str = "DescribeInstances";

/// Instance directory backed by the EC2 control plane.
#[derive(Clone, Debug)]
pub struct Ec2Directory {
    client: Client,
}

impl Ec2Directory {
    /// Creates a directory over the given client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

impl InstanceDirectory for Ec2Directory {
    fn find_by_name<'a>(&'a self, name: &'a str) -> DirectoryFuture<'a, Option<InstanceRef>> {
        Box::pin(async move {
            let output = self
                .client
                .describe_instances()
                .filters(Filter::builder().name("tag:Name").values(name).build())
                .filters(
                    Filter::builder()
                        .name("instance-state-name")
                        .values("running")
                        .values("stopped")
                        .build(),
                )
                .send()
                .await
                .map_err(api_error)?;
            let mut matches = output
                .reservations()
                .iter()
                .flat_map(Reservation::instances)
                .filter_map(instance_ref);
            let first = matches.next();
            if first.is_some() && matches.next().is_some() {
                warn!(name = %name, "several instances share this Name tag; using the first");
            }
            Ok(first)
        })
    }

    fn name_for_id<'a>(&'a self, instance_id: &'a str) -> DirectoryFuture<'a, Option<String>> {
        Box::pin(async move {
            let output = match self
                .client
                .describe_instances()
                .instance_ids(instance_id)
                .send()
                .await
            {
                Ok(output) => output,
                Err(err) if is_unknown_instance(&err) => {
                    warn!(instance = %instance_id, "instance no longer exists; showing its id only");
                    return Ok(None);
                }
                Err(err) => return Err(api_error(err)),
            };
            Ok(output
                .reservations()
                .iter()
                .flat_map(Reservation::instances)
                .next()
                .and_then(name_tag))
        })
    }
}

fn api_error(err: SdkError<DescribeInstancesError>) -> DirectoryError {
    DirectoryError::Api {
        operation: OPERATION,
        message: DisplayErrorContext(err).to_string(),
    }
}

/// Unknown ids come back as `InvalidInstanceID.NotFound` (or `.Malformed`),
/// which the client does not model as a typed variant.
fn is_unknown_instance(err: &SdkError<DescribeInstancesError>) -> bool {
    err.code()
        .is_some_and(|code| code.starts_with("InvalidInstanceID"))
}

fn instance_ref(instance: &Instance) -> Option<InstanceRef> {
    instance.instance_id().map(|id| InstanceRef {
        id: id.to_owned(),
        name: name_tag(instance),
    })
}

fn name_tag(instance: &Instance) -> Option<String> {
    instance
        .tags()
        .iter()
        .find(|tag| tag.key() == Some("Name"))
        .and_then(|tag| tag.value())
        .map(ToOwned::to_owned)
}

//! IAM- and Lambda-backed provisioner for the scheduler function.

use aws_sdk_iam::Client as IamClient;
use aws_sdk_iam::operation::create_role::CreateRoleError;
use aws_sdk_iam::operation::get_role::GetRoleError;
use aws_sdk_lambda::Client as LambdaClient;
use aws_sdk_lambda::operation::create_function::CreateFunctionError;
use aws_sdk_lambda::operation::get_function::GetFunctionError;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{FunctionCode, FunctionConfiguration, Runtime};

use crate::bootstrap::{
    FUNCTION_DESCRIPTION, FUNCTION_HANDLER, FUNCTION_RUNTIME, FunctionSpec, ProvisionFuture,
    Provisioned, Provisioner,
};

use super::AwsApiError;

/// Provisioner backed by the IAM and Lambda control planes.
#[derive(Clone, Debug)]
pub struct IamLambdaProvisioner {
    iam: IamClient,
    lambda: LambdaClient,
}

impl IamLambdaProvisioner {
    /// Creates a provisioner over the given clients.
    #[must_use]
    pub const fn new(iam: IamClient, lambda: LambdaClient) -> Self {
        Self { iam, lambda }
    }
}

impl Provisioner for IamLambdaProvisioner {
    type Error = AwsApiError;

    fn find_role<'a>(
        &'a self,
        role_name: &'a str,
    ) -> ProvisionFuture<'a, Option<String>, Self::Error> {
        Box::pin(async move {
            match self.iam.get_role().role_name(role_name).send().await {
                Ok(output) => {
                    let role = output.role().ok_or(AwsApiError::MissingField {
                        operation: "GetRole",
                        field: "Role",
                    })?;
                    Ok(Some(role.arn().to_owned()))
                }
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(GetRoleError::is_no_such_entity_exception) =>
                {
                    Ok(None)
                }
                Err(err) => Err(AwsApiError::api("GetRole", err)),
            }
        })
    }

    fn create_role<'a>(
        &'a self,
        role_name: &'a str,
        trust_policy: &'a str,
    ) -> ProvisionFuture<'a, Provisioned, Self::Error> {
        Box::pin(async move {
            match self
                .iam
                .create_role()
                .role_name(role_name)
                .assume_role_policy_document(trust_policy)
                .send()
                .await
            {
                Ok(_) => Ok(Provisioned::Created),
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(CreateRoleError::is_entity_already_exists_exception) =>
                {
                    Ok(Provisioned::AlreadyExists)
                }
                Err(err) => Err(AwsApiError::api("CreateRole", err)),
            }
        })
    }

    fn put_role_policy<'a>(
        &'a self,
        role_name: &'a str,
        policy_name: &'a str,
        document: &'a str,
    ) -> ProvisionFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.iam
                .put_role_policy()
                .role_name(role_name)
                .policy_name(policy_name)
                .policy_document(document)
                .send()
                .await
                .map_err(|err| AwsApiError::api("PutRolePolicy", err))?;
            Ok(())
        })
    }

    fn attach_role_policy<'a>(
        &'a self,
        role_name: &'a str,
        policy_arn: &'a str,
    ) -> ProvisionFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.iam
                .attach_role_policy()
                .role_name(role_name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map_err(|err| AwsApiError::api("AttachRolePolicy", err))?;
            Ok(())
        })
    }

    fn find_function<'a>(
        &'a self,
        function_name: &'a str,
    ) -> ProvisionFuture<'a, Option<String>, Self::Error> {
        Box::pin(async move {
            match self
                .lambda
                .get_function()
                .function_name(function_name)
                .send()
                .await
            {
                Ok(output) => {
                    let arn = output
                        .configuration()
                        .and_then(FunctionConfiguration::function_arn)
                        .ok_or(AwsApiError::MissingField {
                            operation: "GetFunction",
                            field: "FunctionArn",
                        })?;
                    Ok(Some(arn.to_owned()))
                }
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(GetFunctionError::is_resource_not_found_exception) =>
                {
                    Ok(None)
                }
                Err(err) => Err(AwsApiError::api("GetFunction", err)),
            }
        })
    }

    fn create_function<'a>(
        &'a self,
        spec: &'a FunctionSpec,
    ) -> ProvisionFuture<'a, Provisioned, Self::Error> {
        Box::pin(async move {
            let code = FunctionCode::builder()
                .zip_file(Blob::new(spec.archive.clone()))
                .build();
            match self
                .lambda
                .create_function()
                .function_name(&spec.function_name)
                .role(&spec.role_arn)
                .runtime(Runtime::from(FUNCTION_RUNTIME))
                .handler(FUNCTION_HANDLER)
                .description(FUNCTION_DESCRIPTION)
                .timeout(spec.timeout_seconds)
                .code(code)
                .send()
                .await
            {
                Ok(_) => Ok(Provisioned::Created),
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(CreateFunctionError::is_resource_conflict_exception) =>
                {
                    Ok(Provisioned::AlreadyExists)
                }
                Err(err) => Err(AwsApiError::api("CreateFunction", err)),
            }
        })
    }
}

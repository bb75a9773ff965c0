//! Naming conventions for the packages and repositories an NfDeploy fans out to.

/// Namespace holding user packages and repositories.
pub const USER_NAMESPACE: &str = "nephio-user";
/// Package holding NF profiles.
pub const NF_PROFILE_PACKAGE: &str = "nf-profiles";
/// Repository holding NF profiles.
pub const NF_PROFILE_REPOSITORY: &str = "private-catalog";
/// Repository holding vendor NF manifests.
pub const VENDOR_NF_MANIFEST_REPOSITORY: &str = "private-catalog";

/// Error returned when a naming context cannot be built.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("Invalid input [cluster: {cluster}, nfDeploy: {nf_deploy}]. Inputs cannot be empty")]
pub struct InvalidInput {
    cluster: String,
    nf_deploy: String,
}

/// Derives names scoped to a single cluster of an NfDeploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingContext {
    cluster: String,
    nf_deploy: String,
}

impl NamingContext {
    /// Create a context for the given cluster and NfDeploy. Both must be non empty.
    pub fn new(cluster: &str, nf_deploy: &str) -> Result<Self, InvalidInput> {
        if cluster.is_empty() || nf_deploy.is_empty() {
            return Err(InvalidInput {
                cluster: cluster.to_owned(),
                nf_deploy: nf_deploy.to_owned(),
            });
        }
        Ok(Self {
            cluster: cluster.to_owned(),
            nf_deploy: nf_deploy.to_owned(),
        })
    }

    /// Namespace of the generated packages.
    pub fn namespace(&self) -> &'static str {
        USER_NAMESPACE
    }

    /// Name of the package deployed to the cluster.
    pub fn deploy_package_name(&self) -> String {
        format!("{}-{}", self.nf_deploy, self.cluster)
    }

    /// Name of the repository the cluster pulls its packages from.
    pub fn deploy_repository_name(&self) -> String {
        format!("{}-deploy-repo", self.cluster)
    }

    /// Package holding the NF profiles.
    pub fn nf_profile_package_name(&self) -> &'static str {
        NF_PROFILE_PACKAGE
    }

    /// Repository holding the NF profiles.
    pub fn nf_profile_repository_name(&self) -> &'static str {
        NF_PROFILE_REPOSITORY
    }

    /// Repository holding the vendor NF manifests.
    pub fn vendor_nf_manifest_repository_name(&self) -> &'static str {
        VENDOR_NF_MANIFEST_REPOSITORY
    }

    /// Package holding the vendor actuators for an NF.
    pub fn vendor_actuators_package_name(&self, vendor: &str, version: &str, nf_type: &str) -> String {
        format!("{vendor}/{version}/{nf_type}/actuators")
    }

    /// Package holding the vendor extension for an NF.
    pub fn vendor_extension_package_name(&self, vendor: &str, version: &str, nf_type: &str) -> String {
        format!("{vendor}/{version}/{nf_type}/extension")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_inputs_are_rejected() {
        let err = NamingContext::new("", "free5gc").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid input [cluster: , nfDeploy: free5gc]. Inputs cannot be empty"
        );
        assert!(NamingContext::new("edge01", "").is_err());
    }

    #[test]
    fn deploy_names() {
        let cx = NamingContext::new("edge01", "free5gc").unwrap();
        assert_eq!(cx.namespace(), "nephio-user");
        assert_eq!(cx.deploy_package_name(), "free5gc-edge01");
        assert_eq!(cx.deploy_repository_name(), "edge01-deploy-repo");
        assert_eq!(cx.nf_profile_package_name(), "nf-profiles");
        assert_eq!(cx.nf_profile_repository_name(), "private-catalog");
        assert_eq!(cx.vendor_nf_manifest_repository_name(), "private-catalog");
    }

    #[test]
    fn vendor_package_names() {
        let cx = NamingContext::new("edge01", "free5gc").unwrap();
        assert_eq!(
            cx.vendor_actuators_package_name("casa", "1.0", "upf"),
            "casa/1.0/upf/actuators"
        );
        assert_eq!(
            cx.vendor_extension_package_name("casa", "1.0", "smf"),
            "casa/1.0/smf/extension"
        );
    }
}

//! The staged join/leave workflow.
//!
//! A linear pipeline of external-tool invocations, one stage at a time.
//! The join path aborts permanently on the first failing stage; external
//! join operations are not safely idempotent to retry blindly, so there
//! is no retry or backoff. The leave path deliberately tolerates a keytab
//! flush failure: flushing must never block realm departure.

use std::collections::BTreeMap;

use realmjoin_core::{classify_join_output, settings, JoinFailure, RealmError};

use crate::caller::CallerHandle;
use crate::command::CommandOutput;
use crate::credentials::CredentialCacheFile;
use crate::service::Deps;

/// Key the workflow synthesizes into the result settings; a caller
/// contract, not data obtained from the tool.
pub const KERBEROS_METHOD_KEY: &str = "kerberos method";
pub const KERBEROS_METHOD_VALUE: &str = "secrets and keytab";

/// Mutable state of one in-flight enroll or leave workflow.
///
/// Owns the transient credential cache exclusively; dropping this value
/// (on any exit path of `join`/`leave`) unlinks the cache file.
pub struct JoinOperation {
    realm: String,
    // Held for its Drop side effect; the path feeds the env overlay.
    _ccache: CredentialCacheFile,
    env: Vec<(String, String)>,
    caller: CallerHandle,
}

impl JoinOperation {
    pub fn new(realm: &str, ccache: CredentialCacheFile, caller: CallerHandle) -> Self {
        // Force a C locale so the tool's error text is stable enough to
        // classify, and point every stage at the transient cache.
        let env = vec![
            ("LC_ALL".to_string(), "C".to_string()),
            (
                "KRB5CCNAME".to_string(),
                ccache.path().to_string_lossy().into_owned(),
            ),
        ];

        Self {
            realm: realm.to_string(),
            _ccache: ccache,
            env,
            caller,
        }
    }

    /// Run one stage of the workflow through the command runner.
    async fn run_tool(&self, deps: &Deps, args: &[&str]) -> anyhow::Result<CommandOutput> {
        if self.caller.is_cancelled() {
            return Err(RealmError::internal("Operation was cancelled").into());
        }

        let mut argv = vec![
            deps.config.tool_path.to_string_lossy().into_owned(),
            "-s".to_string(),
            deps.config.tool_conf.to_string_lossy().into_owned(),
        ];
        argv.extend(args.iter().map(|arg| arg.to_string()));

        self.caller.info(format!("$ {}", argv.join(" ")));
        let out = deps.runner.run(&argv, &self.env, &self.caller).await?;
        if !out.output.trim().is_empty() {
            self.caller.info(out.output.trim_end().to_string());
        }
        Ok(out)
    }

    /// Join sequence: configure realm parameter, join the domain, extract
    /// the host keytab, read the resulting settings.
    pub async fn join(self, deps: &Deps) -> anyhow::Result<BTreeMap<String, String>> {
        let out = self
            .run_tool(
                deps,
                &[
                    "conf",
                    "setparm",
                    settings::GLOBAL_SECTION,
                    "realm",
                    &self.realm,
                ],
            )
            .await?;
        if !out.success() {
            return Err(RealmError::internal("Configuring the domain client failed").into());
        }

        let out = self
            .run_tool(deps, &["-k", "ads", "join", &self.realm])
            .await?;
        if !out.success() {
            let error = match classify_join_output(&out.output) {
                JoinFailure::AuthDenied => RealmError::AuthFailed(format!(
                    "Insufficient permissions to join the domain {}",
                    self.realm
                )),
                JoinFailure::Other => RealmError::Internal(format!(
                    "Joining the domain {} failed",
                    self.realm
                )),
            };
            return Err(error.into());
        }

        let out = self
            .run_tool(deps, &["-k", "ads", "keytab", "create"])
            .await?;
        if !out.success() {
            return Err(RealmError::internal("Extracting host keytab failed").into());
        }

        let out = self.run_tool(deps, &["conf", "list"]).await?;
        if !out.success() {
            return Err(
                RealmError::internal("Listing the resulting configuration failed").into(),
            );
        }

        let mut result = settings::parse_section(&out.output, settings::GLOBAL_SECTION);
        result.insert(KERBEROS_METHOD_KEY.to_string(), KERBEROS_METHOD_VALUE.to_string());
        Ok(result)
    }

    /// Leave sequence: flush keytab entries (best effort), leave the
    /// domain.
    pub async fn leave(self, deps: &Deps) -> anyhow::Result<()> {
        match self.run_tool(deps, &["-k", "ads", "keytab", "flush"]).await {
            Ok(out) if out.success() => {}
            Ok(_) => self
                .caller
                .error("Flushing entries from the keytab failed"),
            Err(err) => self
                .caller
                .error(format!("Flushing entries from the keytab failed: {:#}", err)),
        }

        let out = self.run_tool(deps, &["-k", "ads", "leave"]).await?;
        if !out.success() {
            return Err(RealmError::Internal(format!(
                "Leaving the domain {} failed",
                self.realm
            ))
            .into());
        }

        Ok(())
    }
}

//! Tunnel lifecycle orchestration.
//!
//! [`TunnelService`] is the control API: it ties the config store, the
//! daemon CLI, the process supervisor and DNS registration together. A
//! tunnel moves `absent -> stopped` on create, `stopped <-> running` on
//! start/stop and back to `absent` on delete; `running` is always derived
//! from the live process table.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::daemon::DaemonCli;
use crate::dns::{CloudflareDns, DnsRegistrar, tunnel_dns_target};
use crate::error::{Result, TunnelError};
use crate::names;
use crate::process::{OsProcessTable, ProcessTable};
use crate::store::{ConfigArtifact, ConfigStore, http_service};
use crate::supervisor::ProcessSupervisor;
use crate::tunnel::{Tunnel, TunnelStatus, TunnelSummary, validate_name};

/// Control API over all tunnels in one config directory.
pub struct TunnelService {
    config: ManagerConfig,
    store: ConfigStore,
    supervisor: ProcessSupervisor,
    daemon: DaemonCli,
    dns: Option<Arc<dyn DnsRegistrar>>,
}

impl TunnelService {
    /// Service backed by the OS process table and, when credentials are
    /// configured, the Cloudflare DNS API.
    pub fn new(config: ManagerConfig) -> Self {
        let dns = match CloudflareDns::new(&config.dns) {
            Ok(client) => Some(Arc::new(client) as Arc<dyn DnsRegistrar>),
            Err(e) => {
                debug!(error = %e, "DNS registrar unavailable");
                None
            }
        };
        Self::with_parts(config, Arc::new(OsProcessTable), dns)
    }

    /// Service with explicit collaborators.
    pub fn with_parts(
        config: ManagerConfig,
        processes: Arc<dyn ProcessTable>,
        dns: Option<Arc<dyn DnsRegistrar>>,
    ) -> Self {
        Self {
            store: ConfigStore::new(&config.config_dir),
            supervisor: ProcessSupervisor::new(&config, processes),
            daemon: DaemonCli::new(&config.daemon_bin),
            dns,
            config,
        }
    }

    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub const fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub const fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Create a tunnel forwarding `<name>.<base_domain>` to `port`.
    ///
    /// Without a subdomain a random name is generated. An existing tunnel of
    /// the same name is overwritten. DNS registration failures are logged and
    /// do not fail the call.
    pub async fn create(&self, subdomain: Option<&str>, port: u16) -> Result<Tunnel> {
        let base_domain = self.config.require_base_domain()?;
        if port == 0 {
            return Err(TunnelError::Validation("port must be between 1 and 65535".into()));
        }
        let name = subdomain
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(names::generate, str::to_owned);
        validate_name(&name)?;

        if self.store.exists(&name) {
            warn!(tunnel = %name, "tunnel config already exists and will be overwritten");
        }

        let id = self.daemon.create_tunnel(&name).await?;
        let domain = format!("{name}.{base_domain}");
        let artifact = ConfigArtifact::new(
            &id,
            self.store.credentials_path(&id),
            &domain,
            http_service(&self.config.service_host, port),
        );
        self.store.write(&name, &artifact)?;

        self.register_dns(&domain, &id).await;

        info!(tunnel = %name, id = %id, domain = %domain, port, "tunnel created");
        Ok(Tunnel {
            name,
            id,
            port,
            domain,
            status: TunnelStatus::Stopped,
            pid: None,
            cpu: None,
            memory: None,
            created_at: unix_now(),
        })
    }

    async fn register_dns(&self, hostname: &str, tunnel_id: &str) {
        let Some(dns) = &self.dns else {
            warn!(hostname, "no DNS credentials configured, DNS registration skipped");
            return;
        };
        let target = tunnel_dns_target(tunnel_id);
        if let Err(e) = dns.create_record(hostname, &target, true).await {
            warn!(hostname, target = %target, error = %e, "DNS registration failed, tunnel kept");
        }
    }

    /// Every tunnel with a readable config, sorted by name.
    ///
    /// Tunnels whose config cannot be read are skipped.
    pub fn list(&self) -> Vec<Tunnel> {
        self.store
            .list_names()
            .into_iter()
            .filter_map(|name| match self.load(&name) {
                Ok(tunnel) => Some(tunnel),
                Err(e) => {
                    warn!(tunnel = %name, error = %e, "skipping unreadable tunnel");
                    None
                }
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Result<Tunnel> {
        validate_name(name)?;
        self.load(name)
    }

    fn load(&self, name: &str) -> Result<Tunnel> {
        let record = self.store.read_record(name)?;
        let process = self.supervisor.inspect(name);
        let domain = record.hostname.unwrap_or_else(|| {
            self.config
                .require_base_domain()
                .map(|base| format!("{name}.{base}"))
                .unwrap_or_default()
        });

        Ok(Tunnel {
            name: name.to_string(),
            id: record.id.unwrap_or_default(),
            port: record.port.unwrap_or(0),
            domain,
            status: process.status,
            pid: process.pid,
            cpu: process.cpu,
            memory: process.memory_mb,
            created_at: None,
        })
    }

    /// Launch the tunnel's daemon, replacing a previously recorded instance.
    pub async fn start(&self, name: &str) -> Result<u32> {
        validate_name(name)?;
        self.supervisor.start(name).await
    }

    /// Signal the tunnel's daemon to terminate.
    pub fn stop(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.supervisor.stop(name)
    }

    /// Stop the daemon, delete the daemon-side tunnel and remove local state.
    ///
    /// Missing state is not an error, so deleting twice succeeds.
    pub async fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;

        match self.supervisor.stop(name) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!(tunnel = name, "tunnel was not running"),
            Err(e) => warn!(tunnel = name, error = %e, "failed to stop tunnel before delete"),
        }

        if let Err(e) = self.daemon.delete_tunnel(name).await {
            warn!(tunnel = name, error = %e, "daemon tunnel delete failed, removing local config anyway");
        }

        self.store.remove(name);
        self.supervisor.clear_pid(name);
        info!(tunnel = name, "tunnel deleted");
        Ok(())
    }

    /// Raw YAML of the tunnel's config artifact.
    pub fn get_config(&self, name: &str) -> Result<String> {
        validate_name(name)?;
        self.store.read_raw(name)
    }

    /// Replace the tunnel's config artifact with `raw`.
    ///
    /// Only YAML syntax is checked; the content is stored verbatim.
    pub fn set_config(&self, name: &str, raw: &str) -> Result<()> {
        validate_name(name)?;
        if !self.store.exists(name) {
            return Err(TunnelError::NotFound {
                name: name.to_string(),
            });
        }
        for document in serde_yaml::Deserializer::from_str(raw) {
            serde_yaml::Value::deserialize(document)
                .map_err(|e| TunnelError::Validation(format!("invalid YAML: {e}")))?;
        }
        self.store.write_raw(name, raw)?;
        info!(tunnel = name, bytes = raw.len(), "tunnel config updated");
        Ok(())
    }

    /// Tunnel counts by status.
    pub fn summary(&self) -> TunnelSummary {
        TunnelSummary::from_tunnels(&self.list())
    }
}

fn unix_now() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;

    #[derive(Default)]
    struct FakeProcessTable {
        live: HashSet<u32>,
    }

    impl ProcessTable for FakeProcessTable {
        fn exists(&self, pid: u32) -> bool {
            self.live.contains(&pid)
        }

        fn cpu_percent(&self, _pid: u32) -> Option<f64> {
            Some(1.5)
        }

        fn resident_memory(&self, _pid: u32) -> Option<u64> {
            Some(2 * 1024 * 1024)
        }

        fn terminate(&self, pid: u32) -> std::result::Result<(), nix::errno::Errno> {
            if self.live.contains(&pid) {
                Ok(())
            } else {
                Err(nix::errno::Errno::ESRCH)
            }
        }
    }

    fn service_with(dir: &tempfile::TempDir, live: &[u32]) -> TunnelService {
        let mut config = ManagerConfig::with_config_dir(dir.path());
        config.base_domain = Some("example.com".into());
        config.daemon_bin = "false".into();
        config.ensure_dirs().unwrap();
        let table = FakeProcessTable {
            live: live.iter().copied().collect(),
        };
        TunnelService::with_parts(config, Arc::new(table), None)
    }

    fn seed(service: &TunnelService, name: &str, port: u16) {
        let artifact = ConfigArtifact::new(
            "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
            "/creds.json",
            format!("{name}.example.com"),
            http_service("0.0.0.0", port),
        );
        service.store().write(name, &artifact).unwrap();
    }

    #[tokio::test]
    async fn create_without_base_domain_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ManagerConfig::with_config_dir(dir.path());
        let service = TunnelService::with_parts(config, Arc::new(OsProcessTable), None);

        let err = service.create(Some("app"), 8080).await.unwrap_err();
        assert!(matches!(err, TunnelError::Config(_)));
        assert!(service.list().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_bad_input_before_running_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, &[]);

        let err = service.create(Some("../etc"), 8080).await.unwrap_err();
        assert!(matches!(err, TunnelError::Validation(_)));
        let err = service.create(Some("app"), 0).await.unwrap_err();
        assert!(matches!(err, TunnelError::Validation(_)));
    }

    #[tokio::test]
    async fn failed_daemon_create_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, &[]);

        let err = service.create(Some("app"), 8080).await.unwrap_err();
        assert!(matches!(err, TunnelError::Create(_)));
        assert!(!service.store().exists("app"));
    }

    #[test]
    fn list_on_empty_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, &[]);
        assert!(service.list().is_empty());
        assert_eq!(service.summary(), TunnelSummary::default());
    }

    #[test]
    fn list_skips_unparseable_configs() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, &[]);
        seed(&service, "beta", 9000);
        seed(&service, "alpha", 8080);
        service.store().write_raw("broken", "ingress: [unclosed").unwrap();

        let tunnels = service.list();
        let names: Vec<&str> = tunnels.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert_eq!(tunnels[0].port, 8080);
        assert_eq!(tunnels[0].domain, "alpha.example.com");
        assert_eq!(tunnels[0].id, "6ba7b810-9dad-11d1-80b4-00c04fd430c8");
    }

    #[test]
    fn get_falls_back_to_derived_domain() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, &[]);
        service
            .store()
            .write_raw("bare", "tunnel: abc\ningress:\n  - service: http_status:404\n")
            .unwrap();

        let tunnel = service.get("bare").unwrap();
        assert_eq!(tunnel.id, "abc");
        assert_eq!(tunnel.port, 0);
        assert_eq!(tunnel.domain, "bare.example.com");
    }

    #[test]
    fn get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, &[]);
        assert!(matches!(
            service.get("ghost"),
            Err(TunnelError::NotFound { .. })
        ));
        assert!(matches!(
            service.get_config("ghost"),
            Err(TunnelError::NotFound { .. })
        ));
    }

    #[test]
    fn running_tunnel_reports_process_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, &[4242]);
        seed(&service, "app", 8080);
        seed(&service, "idle", 8081);
        fs::write(service.supervisor().pid_path("app"), "4242").unwrap();

        let tunnel = service.get("app").unwrap();
        assert_eq!(tunnel.status, TunnelStatus::Running);
        assert_eq!(tunnel.pid, Some(4242));
        assert_eq!(tunnel.cpu, Some(1.5));
        assert_eq!(tunnel.memory, Some(2.0));
        assert!(tunnel.created_at.is_none());

        let summary = service.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.running, 1);
        assert_eq!(summary.stopped, 1);
    }

    #[test]
    fn set_config_validates_syntax_only() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, &[]);
        seed(&service, "app", 8080);
        let before = service.get_config("app").unwrap();

        let err = service.set_config("app", "ingress: [oops").unwrap_err();
        assert!(matches!(err, TunnelError::Validation(_)));
        assert_eq!(service.get_config("app").unwrap(), before);

        let structurally_odd = "just: a map\n";
        service.set_config("app", structurally_odd).unwrap();
        assert_eq!(service.get_config("app").unwrap(), structurally_odd);
    }

    #[test]
    fn set_config_accepts_multi_document_streams() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, &[]);
        seed(&service, "app", 8080);

        let stream = "a: 1\n---\nb: 2\n";
        service.set_config("app", stream).unwrap();
        assert_eq!(service.get_config("app").unwrap(), stream);

        let err = service
            .set_config("app", "a: 1\n---\nb: [unclosed\n")
            .unwrap_err();
        assert!(matches!(err, TunnelError::Validation(_)));
        assert_eq!(service.get_config("app").unwrap(), stream);
    }

    #[tokio::test]
    async fn dotted_names_are_listed_and_manageable() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, &[]);
        seed(&service, "my.app", 8080);

        let names: Vec<String> = service.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["my.app"]);

        let tunnel = service.get("my.app").unwrap();
        assert_eq!(tunnel.domain, "my.app.example.com");
        assert_eq!(tunnel.port, 8080);
        assert!(service.get_config("my.app").unwrap().contains("my.app.example.com"));

        service.delete("my.app").await.unwrap();
        assert!(service.list().is_empty());
    }

    #[test]
    fn set_config_on_missing_tunnel_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, &[]);
        let err = service.set_config("ghost", "tunnel: x\n").unwrap_err();
        assert!(matches!(err, TunnelError::NotFound { .. }));
        assert!(!service.store().exists("ghost"));
    }

    #[tokio::test]
    async fn delete_tolerates_missing_state_and_daemon_failure() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, &[]);
        seed(&service, "app", 8080);
        fs::write(service.supervisor().pid_path("app"), "garbage").unwrap();

        service.delete("app").await.unwrap();
        assert!(!service.store().exists("app"));
        assert!(!service.supervisor().pid_path("app").exists());

        service.delete("app").await.unwrap();
        service.delete("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn operations_reject_traversal_names() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, &[]);
        assert!(matches!(
            service.delete("../x").await,
            Err(TunnelError::Validation(_))
        ));
        assert!(matches!(
            service.stop("a/b"),
            Err(TunnelError::Validation(_))
        ));
        assert!(matches!(
            service.start("").await,
            Err(TunnelError::Validation(_))
        ));
    }
}

use super::error::PushError;
use super::report::PushReport;
use crate::config::PushHostsConfig;
use crate::defaults::{DEFAULT_PUT_FILE_NAME, HOSTS_BACKUP_TIMESTAMP_FORMAT, HOSTS_FILE_DIRECTORY};
use crate::falcon::api::{BatchCommand, CommandLevel, FalconApi, HostQuery, Scope};
use crate::falcon::response::{PageOffset, PutFile};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

const FINISHED_MESSAGE: &str =
    "-- Finished launching RTR commands, please check progress in the RTR audit logs";

/// Settings of a single push.
#[derive(Debug, Clone, PartialEq)]
pub struct PushSettings {
    pub scope: Scope,
    pub scope_id: String,
    pub put_file_name: String,
    pub put_file_sha256: Option<String>,
    pub platform_filter: String,
    pub page_size: u32,
    pub max_hosts_per_batch: usize,
    pub queue_offline: bool,
    pub session_timeout: Duration,
    pub command_timeout: Duration,
    pub dry_run: bool,
}

impl PushSettings {
    pub fn new(config: &PushHostsConfig, dry_run: bool) -> Self {
        Self {
            scope: config.scope,
            scope_id: config.scope_id.trim().to_string(),
            put_file_name: config.put_file.name.clone(),
            put_file_sha256: config.put_file.sha256.clone(),
            platform_filter: config.hosts.platform_filter.clone(),
            page_size: config.hosts.page_size(),
            max_hosts_per_batch: config.rtr.max_hosts_per_batch,
            queue_offline: config.rtr.queue_offline,
            session_timeout: config.rtr.session_timeout,
            command_timeout: config.rtr.command_timeout,
            dry_run,
        }
    }
}

/// Name of the backup the current HOSTS file is moved to.
pub fn backup_file_name(now: DateTime<Utc>) -> String {
    format!(
        "{DEFAULT_PUT_FILE_NAME}.{}.backup",
        now.format(HOSTS_BACKUP_TIMESTAMP_FORMAT)
    )
}

/// Removes the `-XX` checksum of a CCID so it can be compared with a plain CID.
fn normalize_cid(cid: &str) -> String {
    cid.trim()
        .split('-')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

pub struct HostsPusher<A>
where
    A: FalconApi,
{
    api: A,
    settings: PushSettings,
}

impl<A> HostsPusher<A>
where
    A: FalconApi,
{
    pub fn new(api: A, settings: PushSettings) -> Self {
        Self { api, settings }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Verifies the scope and the put file, collects the hosts and pushes the HOSTS file to them.
    pub fn run(&self) -> Result<PushReport, PushError> {
        self.verify_scope().map_err(PushError::into_verification)?;
        self.verify_put_file().map_err(PushError::into_verification)?;

        let host_ids = self
            .collect_host_ids()
            .map_err(PushError::into_verification)?;
        if host_ids.is_empty() {
            warn!(
                "No hosts found for {} `{}`, nothing to push",
                self.settings.scope, self.settings.scope_id
            );
            return Ok(PushReport::default());
        }

        if self.settings.dry_run {
            info!(
                "Dry run, skipping RTR sessions for {} hosts",
                host_ids.len()
            );
            let report = PushReport::skipped(&host_ids);
            report.log();
            return Ok(report);
        }

        let report = self.push(&host_ids, Utc::now())?;
        report.log();
        info!("{FINISHED_MESSAGE}");
        Ok(report)
    }

    /// Checks the credentials can reach the hosts in scope.
    pub fn verify_scope(&self) -> Result<(), PushError> {
        let scope_id = &self.settings.scope_id;
        match self.settings.scope {
            Scope::Cid => {
                let ccid = self.api.sensor_ccid()?;
                if normalize_cid(&ccid) != normalize_cid(scope_id) {
                    return Err(PushError::ScopeMismatch {
                        expected: scope_id.clone(),
                        actual: ccid,
                    });
                }
                info!("Verified CID {ccid}");
            }
            Scope::HostGroup => {
                let group = self
                    .api
                    .host_group(scope_id)?
                    .ok_or_else(|| PushError::HostGroupNotFound(scope_id.clone()))?;
                info!("Verified host group `{}` ({})", group.name, group.id);
            }
        }
        Ok(())
    }

    /// Returns the put file that is going to be pushed.
    pub fn verify_put_file(&self) -> Result<PutFile, PushError> {
        let name = &self.settings.put_file_name;
        let files = self.api.put_files(name)?;
        if files.is_empty() {
            return Err(PushError::PutFileNotFound(name.clone()));
        }

        let put_file = match &self.settings.put_file_sha256 {
            Some(expected) => files
                .into_iter()
                .find(|file| file.sha256.eq_ignore_ascii_case(expected))
                .ok_or_else(|| PushError::PutFileHashMismatch {
                    name: name.clone(),
                    expected: expected.clone(),
                })?,
            None => {
                if files.len() > 1 {
                    warn!("{} put files named `{name}` found", files.len());
                }
                files
                    .into_iter()
                    .next()
                    .ok_or_else(|| PushError::PutFileNotFound(name.clone()))?
            }
        };

        info!(
            "Using put file `{}` with sha256 {}",
            put_file.name, put_file.sha256
        );
        Ok(put_file)
    }

    /// Returns the ids of the hosts in scope matching the platform filter, without duplicates.
    pub fn collect_host_ids(&self) -> Result<Vec<String>, PushError> {
        let mut host_ids = Vec::new();
        let mut seen = HashSet::new();
        let mut fetched: u64 = 0;
        let mut offset = None;

        loop {
            let page = self.api.query_host_ids(&HostQuery {
                scope: self.settings.scope,
                scope_id: self.settings.scope_id.clone(),
                filter: self.settings.platform_filter.clone(),
                limit: self.settings.page_size,
                offset: offset.take(),
            })?;
            if page.ids.is_empty() {
                break;
            }

            let page_len = page.ids.len();
            fetched += page_len as u64;
            for id in page.ids {
                if seen.insert(id.clone()) {
                    host_ids.push(id);
                }
            }
            info!(
                "-- Fetched {page_len} hosts, {}/{}",
                host_ids.len(),
                page.total
            );

            if fetched >= page.total {
                break;
            }
            offset = match self.settings.scope {
                Scope::HostGroup => Some(PageOffset::Index(fetched)),
                Scope::Cid => match page.next_offset {
                    Some(PageOffset::Token(token)) if !token.is_empty() => {
                        Some(PageOffset::Token(token))
                    }
                    Some(PageOffset::Index(index)) => Some(PageOffset::Index(index)),
                    _ => break,
                },
            };
        }

        Ok(host_ids)
    }

    /// Backs up the HOSTS file and puts the new one on every host, in batches.
    pub fn push(&self, host_ids: &[String], now: DateTime<Utc>) -> Result<PushReport, PushError> {
        let commands = self.commands(&backup_file_name(now));
        let mut report = PushReport::default();

        for chunk in host_ids.chunks(self.settings.max_hosts_per_batch.max(1)) {
            let session = self.api.batch_init_session(
                chunk,
                self.settings.queue_offline,
                self.settings.session_timeout,
            )?;
            if session.batch_id.is_empty() {
                let reason = if session.errors.is_empty() {
                    "no batch id returned".to_string()
                } else {
                    session.errors.join("; ")
                };
                return Err(PushError::BatchInitFailed(reason));
            }
            info!("Initiated RTR batch with id {}", session.batch_id);
            report.record_session(chunk, &session);

            for (level, command_string) in &commands {
                let command = BatchCommand::new(
                    *level,
                    &session.batch_id,
                    command_string.clone(),
                    self.settings.command_timeout,
                );
                debug!(batch_id = %session.batch_id, "Running `{}`", command.command_string);
                let result = self.api.batch_command(&command)?;
                report.record_command(chunk, &command, &result);
            }
        }

        Ok(report)
    }

    /// Commands run on every host, in order. A put file not named like the HOSTS file is
    /// renamed once in place.
    fn commands(&self, backup_name: &str) -> Vec<(CommandLevel, String)> {
        let put_file_name = &self.settings.put_file_name;
        let mut commands = vec![
            (CommandLevel::Responder, format!("cd {HOSTS_FILE_DIRECTORY}")),
            (
                CommandLevel::Responder,
                format!("mv {DEFAULT_PUT_FILE_NAME} {backup_name}"),
            ),
            (CommandLevel::Admin, format!("put {put_file_name}")),
        ];
        if put_file_name != DEFAULT_PUT_FILE_NAME {
            commands.push((
                CommandLevel::Responder,
                format!("mv {put_file_name} {DEFAULT_PUT_FILE_NAME}"),
            ));
        }
        commands
    }
}

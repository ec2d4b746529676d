//! Offline registry audit.
//!
//! Re-derives every invariant the engine maintains online and reports
//! drift in a snapshot: counter identities, mask agreement, containment
//! and uniqueness of active assignments, gateway-policy agreement, and
//! cross-pool overlap. Pools are audited in parallel; findings come out
//! in a stable order regardless of worker scheduling.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use color_eyre::eyre::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use crate::pool::{
    AddressAssignment, AddressPool, GatewayPolicy, RegistrySnapshot, StandardGatewayPolicy,
};

/// One invariant violation found in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub pool_id: String,
    pub message: String,
}

/// Result of one audit run
#[derive(Debug, Serialize)]
pub struct AuditReport {
    pub audited_at: DateTime<Utc>,
    pub pools_checked: usize,
    pub assignments_checked: usize,
    pub findings: Vec<Finding>,
}

impl AuditReport {
    pub fn clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Audit a snapshot: per-pool checks in parallel, then the cross-pool
/// properties.
pub fn run_audit(snapshot: &RegistrySnapshot) -> AuditReport {
    let mut active_by_pool: HashMap<&str, Vec<&AddressAssignment>> = HashMap::new();
    for assignment in &snapshot.assignments {
        if assignment.is_active {
            active_by_pool
                .entry(assignment.pool_id.as_str())
                .or_default()
                .push(assignment);
        }
    }
    let no_assignments: Vec<&AddressAssignment> = Vec::new();

    let mut findings: Vec<Finding> = snapshot
        .pools
        .par_iter()
        .flat_map(|pool| {
            let active = active_by_pool
                .get(pool.id.as_str())
                .unwrap_or(&no_assignments);
            audit_pool(pool, active)
        })
        .collect();

    findings.extend(audit_cross_pool(&snapshot.pools));
    findings.extend(audit_orphans(snapshot));
    findings.sort_by(|a, b| a.pool_id.cmp(&b.pool_id).then(a.message.cmp(&b.message)));

    AuditReport {
        audited_at: Utc::now(),
        pools_checked: snapshot.pools.len(),
        assignments_checked: snapshot.assignments.len(),
        findings,
    }
}

fn audit_pool(pool: &AddressPool, active: &[&AddressAssignment]) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut push = |message: String| {
        findings.push(Finding {
            pool_id: pool.id.clone(),
            message,
        })
    };

    if let Err(err) = pool.validate() {
        push(err.to_string());
    }

    if pool.used_addresses != active.len() as u64 {
        push(format!(
            "Counters record {} used but {} active assignments exist",
            pool.used_addresses,
            active.len()
        ));
    }

    let policy = StandardGatewayPolicy;
    let mut holders: HashMap<u32, &str> = HashMap::new();
    for assignment in active {
        if !pool.contains(assignment.assigned_ip) {
            push(format!(
                "Active assignment {} at {} lies outside the range",
                assignment.id, assignment.assigned_ip
            ));
        }
        if let Some(first) = holders.insert(u32::from(assignment.assigned_ip), assignment.id.as_str()) {
            push(format!(
                "Address {} is held by assignments {} and {}",
                assignment.assigned_ip, first, assignment.id
            ));
        }
        let expected = policy.derive_gateway(assignment.assigned_ip, pool.customer_class);
        if assignment.assigned_gateway != expected {
            push(format!(
                "Assignment {} gateway {} does not match the current policy (expected {})",
                assignment.id, assignment.assigned_gateway, expected
            ));
        }
        if assignment.deactivated_at.is_some() {
            push(format!(
                "Assignment {} is active but carries a deactivation timestamp",
                assignment.id
            ));
        }
    }

    findings
}

fn audit_cross_pool(pools: &[AddressPool]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (i, a) in pools.iter().enumerate() {
        for b in &pools[i + 1..] {
            if a.overlaps(b) {
                findings.push(Finding {
                    pool_id: a.id.clone(),
                    message: format!(
                        "Range {} - {} overlaps pool {} ({} - {})",
                        a.start_ip, a.end_ip, b.id, b.start_ip, b.end_ip
                    ),
                });
            }
        }
    }
    findings
}

fn audit_orphans(snapshot: &RegistrySnapshot) -> Vec<Finding> {
    let pool_ids: HashSet<&str> = snapshot.pools.iter().map(|p| p.id.as_str()).collect();
    snapshot
        .assignments
        .iter()
        .filter(|a| !pool_ids.contains(a.pool_id.as_str()))
        .map(|a| Finding {
            pool_id: a.pool_id.clone(),
            message: format!("Assignment {} references a pool that does not exist", a.id),
        })
        .collect()
}

/// Generate JSON report
pub fn generate_json_report(report: &AuditReport, output_path: &Path) -> Result<()> {
    let json =
        serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

/// Generate human-readable text report
pub fn generate_text_report(report: &AuditReport, output_path: &Path) -> Result<()> {
    let mut lines: Vec<String> = Vec::new();

    lines.push("=".repeat(80));
    lines.push("                          WANPOOL REGISTRY AUDIT".to_string());
    lines.push("=".repeat(80));
    lines.push(String::new());

    lines.push(format!("Audit Date: {}", report.audited_at));
    lines.push(format!("Pools Checked: {}", report.pools_checked));
    lines.push(format!(
        "Assignment Records: {}",
        report.assignments_checked
    ));
    lines.push(String::new());

    if report.findings.is_empty() {
        lines.push("No findings. Every registry invariant holds.".to_string());
        lines.push(String::new());
    } else {
        lines.push(format!("FINDINGS ({})", report.findings.len()));
        lines.push(String::new());
        for (i, finding) in report.findings.iter().enumerate() {
            lines.push(format!(
                "  {}. [{}] {}",
                i + 1,
                finding.pool_id,
                finding.message
            ));
        }
        lines.push(String::new());
        lines.push("RECOMMENDATION: Reconcile the store against assignment records".to_string());
        lines.push("before resuming allocations from the affected pools.".to_string());
        lines.push(String::new());
    }

    lines.push("=".repeat(80));

    let content = lines.join("\n");
    fs::write(output_path, content)
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Print a summary to stdout
pub fn print_summary(report: &AuditReport) {
    println!("\n=== REGISTRY AUDIT SUMMARY ===\n");
    println!("Pools: {}", report.pools_checked);
    println!("Assignment records: {}", report.assignments_checked);

    if report.findings.is_empty() {
        println!("\nClean: every registry invariant holds.");
    } else {
        println!("\nFindings: {}", report.findings.len());
        for finding in report.findings.iter().take(10) {
            println!("  [{}] {}", finding.pool_id, finding.message);
        }
        if report.findings.len() > 10 {
            println!("  ... and {} more (see the full report)", report.findings.len() - 10);
        }
    }

    println!();
}

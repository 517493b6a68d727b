//! # Inspect Subcommand
//!
//! Decodes a holder snapshot file and prints what the client derives from
//! it, as seen by a given caller at a given instant.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use ith_client::{detect, next_delay, AutomaticAction, ClientConfig};
use ith_core::{Clock, Principal, SystemClock, TimestampMillis};
use ith_state::{
    next_step, ActionFlags, BuyerOffer, CallerRole, CertificateStatus, HolderAction,
    HolderInformation, HolderView, Panel, Permissions, Phase, SaleStatus,
};

/// Arguments for the inspect subcommand.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to a snapshot as returned by `fetchHolderInformation`.
    pub snapshot: PathBuf,

    /// Principal of the caller. Omit for an anonymous caller.
    #[arg(long)]
    pub caller: Option<String>,

    /// Current instant in Unix milliseconds. Defaults to the system clock.
    #[arg(long)]
    pub now: Option<u64>,

    /// Assume the user-agreement checkbox is set.
    #[arg(long)]
    pub agreement_checked: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Everything the client derives from one snapshot.
#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub update_version: u64,
    pub legal: bool,
    pub state: Option<String>,
    pub phase: Phase,
    pub step: Option<u8>,
    pub panel: Panel,
    pub role: CallerRole,
    pub sale_status: SaleStatus,
    pub best_offer: Option<BuyerOffer>,
    pub certificate: CertificateStatus,
    pub quarantine_active: bool,
    pub allowed_actions: Vec<HolderAction>,
    pub automatic_action: Option<AutomaticAction>,
    pub next_refresh_ms: Option<u64>,
}

/// Build the report for `info` seen by `caller` at `now`.
pub fn build_report(
    info: HolderInformation,
    caller: Option<&Principal>,
    now: TimestampMillis,
    flags: ActionFlags,
    config: &ClientConfig,
) -> InspectReport {
    let update_version = info.update_version;
    let view = HolderView::from_snapshot(Some(Arc::new(info)));
    let role = view.role_of(caller);
    let permissions = Permissions::new(&view, caller, now);
    let flags = ActionFlags {
        allow_anonymous: flags.allow_anonymous || config.allow_anonymous_buyers,
        ..flags
    };
    let next_refresh_ms = next_delay(&view, role, now, false, config)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
    InspectReport {
        update_version,
        legal: view.is_loaded(),
        state: view.state().map(|s| s.describe()),
        phase: view.phase(),
        step: view.step().map(|s| s.as_u8()),
        panel: next_step(&view),
        role,
        sale_status: view.sale_status(),
        best_offer: view.sale_deal().and_then(|d| d.best_offer()).cloned(),
        certificate: view.certificate_status(now),
        quarantine_active: view.quarantine_active(now),
        allowed_actions: permissions.allowed_actions(flags),
        automatic_action: detect(&view, false),
        next_refresh_ms,
    }
}

pub fn run(args: &InspectArgs) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.snapshot)
        .with_context(|| format!("reading {}", args.snapshot.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", args.snapshot.display()))?;
    let info = HolderInformation::from_value(value)?;
    let caller = args
        .caller
        .as_deref()
        .map(Principal::parse)
        .transpose()
        .context("invalid --caller")?;
    let now = args
        .now
        .map_or_else(|| SystemClock.now(), TimestampMillis::from_millis);
    let config = ClientConfig::from_env()?;
    let flags = ActionFlags {
        agreement_checked: args.agreement_checked,
        ..ActionFlags::default()
    };

    tracing::debug!(update_version = info.update_version, %now, "inspecting snapshot");
    let report = build_report(info, caller.as_ref(), now, flags, &config);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("update_version  {}", report.update_version);
    println!(
        "state           {}",
        report.state.as_deref().unwrap_or("<illegal>")
    );
    println!("phase           {}", report.phase);
    match report.step {
        Some(step) => println!("step            {step}/3"),
        None => println!("step            -"),
    }
    println!("role            {}", report.role);
    println!("sale            {}", report.sale_status);
    if let Some(offer) = &report.best_offer {
        println!("best offer      {} from {}", offer.price, offer.buyer);
    }
    println!("certificate     {:?}", report.certificate);
    println!("quarantine      {}", report.quarantine_active);
    let actions: Vec<&str> = report
        .allowed_actions
        .iter()
        .map(|a| a.call_name())
        .collect();
    println!("allowed         {}", actions.join(", "));
    match report.automatic_action {
        Some(action) => println!("automatic       {action}"),
        None => println!("automatic       -"),
    }
    if let Some(ms) = report.next_refresh_ms {
        println!("next refresh    {ms} ms");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(state: Value) -> HolderInformation {
        HolderInformation::from_value(json!({
            "owner": "aaaaa-aa",
            "update_version": 9,
            "state": state,
            "certificate_expiration": 5_000
        }))
        .unwrap()
    }

    #[test]
    fn owner_in_hold_can_list_or_release() {
        let owner = Principal::parse("aaaaa-aa").unwrap();
        let report = build_report(
            info(json!({"Holding": {"sub_state": {"Hold": {}}}})),
            Some(&owner),
            TimestampMillis(1_000),
            ActionFlags::default(),
            &ClientConfig::default(),
        );
        assert!(report.legal);
        assert_eq!(report.role, CallerRole::Owner);
        assert_eq!(report.certificate, CertificateStatus::Valid);
        assert!(report.allowed_actions.contains(&HolderAction::SetSaleIntention));
        assert!(report.allowed_actions.contains(&HolderAction::StartRelease));
        assert_eq!(report.automatic_action, None);
        assert_eq!(report.next_refresh_ms, Some(5_000));
    }

    #[test]
    fn illegal_snapshot_reports_fallback() {
        let report = build_report(
            info(json!({"Capture": null, "Closed": null})),
            None,
            TimestampMillis(1_000),
            ActionFlags::default(),
            &ClientConfig::default(),
        );
        assert!(!report.legal);
        assert_eq!(report.panel, Panel::Fallback);
        assert!(report.allowed_actions.is_empty());
    }

    #[test]
    fn listed_holder_reports_best_bid_to_guest() {
        let guest = Principal::parse("2ibo7-dia").unwrap();
        let report = build_report(
            info(json!({"Holding": {"sub_state": {"Hold": {"sale_deal_state": {"Trading": {
                "sale_offer": {"price": 1000},
                "buyer_offers": [
                    {"buyer": "2ibo7-dia", "price": 700, "time": 10},
                    {"buyer": "2vxsx-fae", "price": 900, "time": 20}
                ]
            }}}}}})),
            Some(&guest),
            TimestampMillis(1_000),
            ActionFlags::default(),
            &ClientConfig::default(),
        );
        assert_eq!(report.role, CallerRole::Guest);
        assert_eq!(report.sale_status, SaleStatus::Listed);
        assert_eq!(report.best_offer.map(|o| o.price), Some(900));
        assert!(report.allowed_actions.contains(&HolderAction::CancelBuyerOffer));
    }
}

//! Demo: wire the in-memory store and the scripted provider, precheck a
//! small contact list, dispatch it, and watch the controller react.

use std::sync::Arc;

use herald_core::domain::template::{Binding, TemplateSection};
use herald_core::impls::{FakeProvider, InMemoryStore};
use herald_core::ports::clock::SystemClock;
use herald_core::ports::id_generator::{IdGenerator, UlidGenerator};
use herald_core::{
    CampaignPlan, ContactSnapshot, Destination, HeraldBuilder, ProviderFailure, QuarantineFilter,
    SenderId, TemplateContract, throttle,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // (A) Store と Provider を用意（デモはすべて in-memory）
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(FakeProvider::new());
    let ids = UlidGenerator::new(Arc::new(SystemClock));

    let herald = HeraldBuilder::new()
        .store(store)
        .provider(provider.clone())
        .build()?;

    // (B) Sender に throttle 設定を保存（プリセットをそのまま使う）
    let sender = SenderId::new("wa:+5511988880000");
    herald
        .save_throttle_config(&sender, throttle::BALANCED)
        .await?;

    // (C) Provider の失敗をスクリプト：
    //     - 1本目は rate limit を一度だけ返す（次のバッチで成功する）
    //     - 2本目は undeliverable（quarantine に入る）
    let rate_limited = Destination::parse("+5511999990001")?;
    let undeliverable = Destination::parse("+5511999990002")?;
    provider.fail_next(
        rate_limited.clone(),
        ProviderFailure::new(130429, "Rate limit hit").with_trace_id("demo-trace-1"),
    );
    provider.fail_next(
        undeliverable.clone(),
        ProviderFailure::new(131026, "Message undeliverable").with_trace_id("demo-trace-2"),
    );

    let contract = TemplateContract::new("order_update", "pt_BR")
        .with_placeholder("{{1}}", TemplateSection::Body, Binding::Name)
        .with_placeholder(
            "{{2}}",
            TemplateSection::Body,
            Binding::Custom("delivery_date".to_string()),
        )
        .with_placeholder(
            "{{3}}",
            TemplateSection::ButtonUrl,
            Binding::Dynamic("Tracking Link".to_string()),
        );

    let contacts = vec![
        contact(&ids, "+55 11 99999-0001", Some("Ana"), Some("2026-03-05")),
        contact(&ids, "+55 11 99999-0002", Some("Bruno"), Some("2026-03-06")),
        contact(&ids, "+55 11 99999-0003", Some("Carla"), Some("2026-03-07")),
        contact(&ids, "+55 11 99999-0004", Some("Duda"), None), // missing {{2}}
        contact(&ids, "not-a-phone", Some("Edu"), Some("2026-03-08")),
        contact(&ids, "+55 11 99999-0006", Some("Fabi"), Some("2026-03-09")),
    ];

    // (D) Precheck：送れる相手と除外される相手を仕分けする
    let campaign_id = ids.generate_campaign_id();
    let report = herald.run_precheck(campaign_id, &contract, &contacts).await?;
    println!(
        "precheck: {} sendable, {} skipped",
        report.valid_count, report.skipped_count
    );
    for result in report.results.iter().filter(|r| !r.ok) {
        println!(
            "  skipped {}: {:?} missing={:?}",
            result.contact_id,
            result.skip_code,
            result
                .missing
                .iter()
                .map(|m| format!("{} ({})", m.raw, m.resolved_label))
                .collect::<Vec<_>>()
        );
    }

    // (E) Dispatch：バッチ完了イベントを流しながら送信する
    let mut handle = herald.dispatch(CampaignPlan {
        campaign_id,
        sender: sender.clone(),
    });
    while let Some(event) = handle.next_event().await {
        println!(
            "batch {}: sent={} failed={} skipped={} overload={} target={:.1}mps ({}ms)",
            event.batch_index,
            event.report.sent,
            event.report.failed,
            event.report.skipped,
            event.report.overload_observed,
            event.target_mps,
            event.report.elapsed_ms
        );
    }
    let summary = handle.join().await?;
    println!(
        "done: {} batches, sent={} failed={} cancelled={}",
        summary.batches, summary.sent, summary.failed, summary.cancelled
    );

    // (F) 結果の確認：counts / throttle 状態 / quarantine 一覧
    let counts = herald.attempt_counts(campaign_id).await?;
    println!("attempts: {counts:?}");

    let status = herald.get_throttle_status(&sender).await?;
    if let Some(state) = &status.state {
        println!(
            "throttle: target={:.1}mps cooldown_until={:?}",
            state.target_mps, state.cooldown_until
        );
    }

    for entry in herald
        .list_quarantine(QuarantineFilter {
            active_only: true,
            ..QuarantineFilter::default()
        })
        .await?
    {
        println!(
            "quarantined {} until {:?}: {}",
            entry.destination, entry.expires_at, entry.reason
        );
    }

    Ok(())
}

fn contact(
    ids: &UlidGenerator,
    phone: &str,
    name: Option<&str>,
    delivery_date: Option<&str>,
) -> ContactSnapshot {
    let mut snapshot = ContactSnapshot::new(ids.generate_contact_id(), phone);
    if let Some(name) = name {
        snapshot = snapshot.with_name(name);
    }
    if let Some(date) = delivery_date {
        snapshot = snapshot.with_custom_field("delivery_date", date);
    }
    snapshot
}

//! `nexus demo` - catalog / pricing 두 서비스로 전체 흐름 실행

use nexus_core::{
    handler_fn, ChannelType, Message, Orchestrator, ServiceDescriptor, ServiceRequest,
    ServiceStatus,
};
use serde_json::json;
use std::sync::Arc;

pub async fn run(nexus: &Orchestrator) -> anyhow::Result<()> {
    let registry = nexus.registry();
    let bus = nexus.bus();
    let comm = nexus.communication();

    // 1. 등록 + 의존성 순서대로 활성화
    registry
        .register_service(
            ServiceDescriptor::new("catalog", "Catalog", "1.0.0")
                .with_category("commerce")
                .with_capability("products"),
        )?
        .into_result()?;
    registry
        .register_service(
            ServiceDescriptor::new("pricing", "Pricing", "1.0.0")
                .with_category("commerce")
                .with_capability("quotes")
                .with_dependency("catalog"),
        )?
        .into_result()?;

    let order = registry.activate_with_dependencies("pricing")?;
    println!("Activated: {}", order.join(" -> "));

    // 2. 요청 / 응답
    bus.respond(
        "pricing",
        "quote",
        handler_fn(|request: ServiceRequest, _cancel| async move {
            let sku = request.params["sku"].as_str().unwrap_or_default().to_string();
            Ok(json!({ "sku": sku, "price": 1999 }))
        }),
    );
    let response = bus
        .request(ServiceRequest::new("catalog", "pricing", "quote", json!({ "sku": "A-100" })))
        .await?;
    println!("Quote: {}", response.data);

    // 3. 채널 메시지
    comm.subscribe_to_service(
        "pricing",
        Arc::new(|message: &Message| {
            println!("[pricing] received {} from {}", message.content, message.sender_id);
        }),
    );
    comm.create_channel(
        "inventory",
        ChannelType::Multicast,
        &["catalog".to_string(), "pricing".to_string()],
    )?;
    comm.broadcast_message("catalog", json!({ "event": "restock", "sku": "A-100" }))?;
    comm.send_direct_message("catalog", "pricing", json!({ "event": "price-check" }))?;

    // 4. 프레즌스 + 데이터 동기화
    comm.set_service_status("catalog", ServiceStatus::Online)?;
    comm.set_service_status("pricing", ServiceStatus::Busy)?;
    let synced = comm.sync_service_data("catalog", json!({ "products": 42 }))?;
    println!("Catalog data v{}", synced.version);

    println!("Online: {}", comm.get_online_services().join(", "));
    println!("Unread for pricing: {}", comm.get_unread_count("pricing"));

    let bus_stats = bus.stats();
    let comm_stats = comm.stats();
    println!(
        "Bus: {} events, {} requests | Channels: {} ({} messages)",
        bus_stats.events_published,
        bus_stats.requests_sent,
        comm_stats.total_channels,
        comm_stats.total_messages
    );

    Ok(())
}

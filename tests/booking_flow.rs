//! Сквозной сценарий дня мероприятия поверх JSON-бэкенда: студенческая
//! бронь, синхронизация офлайн-записей, админская преброня, подтверждение
//! оплаты и массовый сброс.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Map;
use stolovka::error::DomainError;
use stolovka::models::{BookingStatus, TOTAL_SEATS};
use stolovka::services::booking::{NewBooking, SyncRecord};
use stolovka::services::BookingService;
use stolovka::store::json_file::JsonFileStore;

async fn service() -> BookingService {
    let path = std::env::temp_dir().join(format!("stolovka-flow-{}.json", uuid::Uuid::new_v4()));
    BookingService::new(Arc::new(JsonFileStore::new(path).await.unwrap()))
}

fn student_booking(seat: &str) -> NewBooking {
    NewBooking {
        first_name: "Ivan".into(),
        last_name: "Petrov".into(),
        phone: "+996555123456".into(),
        email: Some("ivan.petrov@example.com".into()),
        seat_id: seat.into(),
        metadata: Map::new(),
    }
}

#[tokio::test]
async fn booking_lifecycle_drives_the_projection() {
    let svc = service().await;

    // студент бронирует 12-7
    let booking = svc.create_booking(student_booking("12-7")).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);

    let statuses = svc.seat_statuses().await.unwrap();
    assert_eq!(statuses.len(), TOTAL_SEATS);
    assert_eq!(statuses["12-7"], "pending");

    // админ подтверждает оплату
    let confirmed = svc.confirm_booking(&booking.id, "admin").await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(svc.seat_statuses().await.unwrap()["12-7"], "reserved");

    // жёсткое удаление возвращает место
    let deleted = svc.delete_booking(&booking.id).await.unwrap();
    assert_eq!(deleted.id, booking.id);
    assert_eq!(svc.seat_statuses().await.unwrap()["12-7"], "available");
}

#[tokio::test]
async fn offline_sync_and_fresh_bookings_share_one_invariant() {
    let svc = service().await;

    // свежая бронь через обычный путь
    svc.create_booking(student_booking("2-1")).await.unwrap();

    // офлайн-клиент приносит свои записи: одна новая, одна претендует
    // на уже занятое место
    let mut batch = HashMap::new();
    batch.insert(
        "offline-a".to_string(),
        SyncRecord {
            seat_id: "2-2".into(),
            status: Some("paid".into()),
            first_name: Some("Begimai".into()),
            last_name: Some("Toktogulova".into()),
            phone: Some("+996700445566".into()),
            ..Default::default()
        },
    );
    batch.insert(
        "offline-b".to_string(),
        SyncRecord {
            seat_id: "2-1".into(),
            ..Default::default()
        },
    );

    let outcome = svc.sync_local_bookings(batch.clone()).await.unwrap();
    assert_eq!(outcome.synced_count, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].id, "offline-b");

    // повтор того же батча ничего не дублирует
    let rerun = svc.sync_local_bookings(batch).await.unwrap();
    assert_eq!(rerun.synced_count, 0);
    assert_eq!(rerun.skipped_count, 1);

    let imported = svc.get_booking("offline-a").await.unwrap();
    assert_eq!(imported.status, BookingStatus::Confirmed);
    assert_eq!(svc.seat_statuses().await.unwrap()["2-2"], "reserved");
}

#[tokio::test]
async fn admin_prebook_then_bulk_release_resets_the_hall() {
    let svc = service().await;

    svc.create_booking(student_booking("1-1")).await.unwrap();
    let prebooked = svc
        .prebook_seats(vec!["1-1".into(), "30-10".into(), "bad-id".into()])
        .await
        .unwrap();
    assert_eq!(prebooked.booked, vec!["30-10"]);
    assert_eq!(prebooked.skipped.len(), 2);

    let statuses = svc.seat_statuses().await.unwrap();
    assert_eq!(statuses["30-10"], "prebooked");
    assert_eq!(statuses["1-1"], "pending");

    let released = svc.release_all_seats().await.unwrap();
    assert_eq!(released, 2);

    let statuses = svc.seat_statuses().await.unwrap();
    assert!(statuses.values().all(|s| s == "available"));

    // место свободно сразу же, без выдержки
    svc.create_booking(student_booking("1-1")).await.unwrap();
}

#[tokio::test]
async fn losing_a_race_reads_like_a_taken_seat() {
    let svc = service().await;
    svc.create_booking(student_booking("7-7")).await.unwrap();

    match svc.create_booking(student_booking("7-7")).await {
        Err(DomainError::SeatUnavailable { seat_id }) => assert_eq!(seat_id, "7-7"),
        other => panic!("expected SeatUnavailable, got {:?}", other.map(|b| b.id)),
    }
}

mod common;

use anyhow::Result;
use balance_ledger::domain::{ReservationStatus, RevenuePeriod};
use balance_ledger::io::ReportWriter;
use common::{funded_account, order, parse_date, test_service, test_service_with_config};

fn november() -> RevenuePeriod {
    RevenuePeriod::new(11, 2022).unwrap()
}

#[tokio::test]
async fn test_end_to_end_approve_and_disapprove() -> Result<()> {
    let (service, config, _temp) = test_service_with_config().await?;
    service.register_service(5, "delivery").await?;
    let settled = parse_date("2022-11-15");

    // Account 1 starts at 0 and receives 1000.00
    let account = service.deposit(1, 100000).await?;
    assert_eq!(account.balance, 100000);

    let account = service.reserve(order(1, 5, 42), 30000).await?;
    assert_eq!(account.balance, 70000);
    assert_eq!(
        service.get_reservation(order(1, 5, 42)).await?.status,
        ReservationStatus::Held
    );

    let reservation = service.approve_at(order(1, 5, 42), 30000, settled).await?;
    assert_eq!(reservation.status, ReservationStatus::Approved);
    assert_eq!(reservation.settled_at, Some(settled));
    assert_eq!(service.get_balance(1).await?.balance, 70000);

    let account = service.reserve(order(1, 5, 43), 20000).await?;
    assert_eq!(account.balance, 50000);

    let reservation = service.disapprove_at(order(1, 5, 43), 20000, settled).await?;
    assert_eq!(reservation.status, ReservationStatus::Disapproved);
    assert_eq!(service.get_balance(1).await?.balance, 70000);

    // Only the approved order counts toward revenue.
    let records = service.monthly_revenue_by_service(november()).await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].service_id, 5);
    assert_eq!(records[0].service_name, "delivery");
    assert_eq!(records[0].total_amount, 30000);

    let link = ReportWriter::from_config(&config).write(november(), &records)?;
    assert_eq!(
        link.link,
        "/api/v1/balance/month_reports/report_11_2022.csv"
    );
    assert!(link.path.starts_with(&config.reports_dir));

    let mut reader = csv::Reader::from_path(&link.path)?;
    let headers = reader.headers()?.clone();
    assert_eq!(&headers, vec!["service_name", "amount"]);

    let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0], vec!["delivery", "300.00"]);

    assert!(service.check_integrity().await?.is_healthy());
    Ok(())
}

#[tokio::test]
async fn test_revenue_grouped_and_ordered_by_service_name() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.register_service(1, "zeta hosting").await?;
    service.register_service(2, "alpha delivery").await?;
    funded_account(&service, 1, 100000).await?;
    funded_account(&service, 2, 100000).await?;

    let settled = parse_date("2022-11-10");
    let orders = [
        (order(1, 1, 1), 1000),
        (order(1, 2, 2), 2000),
        (order(2, 2, 3), 3000),
        (order(2, 9, 4), 4000),
    ];
    for (key, amount) in orders {
        service.reserve(key, amount).await?;
        service.approve_at(key, amount, settled).await?;
    }

    let records = service.monthly_revenue_by_service(november()).await?;
    let summary: Vec<(&str, i64)> = records
        .iter()
        .map(|r| (r.service_name.as_str(), r.total_amount))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("alpha delivery", 5000),
            ("service-9", 4000),
            ("zeta hosting", 1000)
        ]
    );

    let report = service.monthly_revenue_report(november()).await?;
    assert_eq!(report.total, 10000);
    assert_eq!(report.services, records);

    Ok(())
}

#[tokio::test]
async fn test_revenue_respects_month_bounds() -> Result<()> {
    let (service, _temp) = test_service().await?;
    funded_account(&service, 1, 100000).await?;

    let settlements = [
        (42, "2022-10-31"),
        (43, "2022-11-01"),
        (44, "2022-11-30"),
        (45, "2022-12-01"),
    ];
    for (order_id, date) in settlements {
        service.reserve(order(1, 5, order_id), 1000).await?;
        service
            .approve_at(order(1, 5, order_id), 1000, parse_date(date))
            .await?;
    }

    // Held reservations never count, whatever their age.
    service.reserve(order(1, 5, 46), 5000).await?;

    let records = service.monthly_revenue_by_service(november()).await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].total_amount, 2000);

    let december = service
        .monthly_revenue_by_service(RevenuePeriod::new(12, 2022).unwrap())
        .await?;
    assert_eq!(december[0].total_amount, 1000);

    Ok(())
}

#[tokio::test]
async fn test_empty_month_is_not_an_error() -> Result<()> {
    let (service, config, _temp) = test_service_with_config().await?;

    let records = service.monthly_revenue_by_service(november()).await?;
    assert!(records.is_empty());

    let report = service.monthly_revenue_report(november()).await?;
    assert!(report.is_empty());
    assert_eq!(report.total, 0);

    // The report still gets a header-only file.
    let link = ReportWriter::from_config(&config).write(november(), &records)?;
    let content = std::fs::read_to_string(&link.path)?;
    assert_eq!(content, "service_name,amount\n");

    Ok(())
}

#[tokio::test]
async fn test_report_reflects_renamed_service() -> Result<()> {
    let (service, _temp) = test_service().await?;
    funded_account(&service, 1, 10000).await?;
    service.reserve(order(1, 5, 1), 2500).await?;
    service
        .approve_at(order(1, 5, 1), 2500, parse_date("2022-11-02"))
        .await?;

    let before = service.monthly_revenue_by_service(november()).await?;
    assert_eq!(before[0].service_name, "service-5");

    service.register_service(5, "delivery").await?;
    let after = service.monthly_revenue_by_service(november()).await?;
    assert_eq!(after[0].service_name, "delivery");
    assert_eq!(after[0].total_amount, 2500);

    Ok(())
}

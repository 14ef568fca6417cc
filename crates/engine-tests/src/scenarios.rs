#[cfg(test)]
mod tests {
    use crate::utils::{
        MemoryWarehouse, REVIEWS_TEMPLATE, connection_reset, memory_cache, options, session,
    };
    use connectors::sql::base::error::{ConnectorError, DbError};
    use engine_core::{
        cache::{PageCache, fingerprint, sled_store::SledCacheBackend},
        error::PageError,
    };
    use engine_runtime::{
        execution::{
            builder::{Paginator, PaginatorBuilder},
            parallel::{RangePage, partition, run_partitioned},
        },
        source::{PageSource, into_stream},
    };
    use futures::TryStreamExt;
    use model::pagination::page::Page;
    use planner::query::{dialect::Postgres, enrich::EnrichmentQuery, template::QueryTemplate};
    use std::{collections::BTreeSet, num::NonZeroUsize, sync::Arc, time::Duration};
    use engine_config::settings::PagerSettings;
    use engine_core::context::SessionContext;
    use tokio::{sync::mpsc, time::Instant};

    fn template() -> QueryTemplate {
        QueryTemplate::parse(REVIEWS_TEMPLATE).unwrap()
    }

    async fn collect(paginator: &mut Paginator) -> Result<Vec<Page>, PageError> {
        let mut pages = Vec::new();
        while let Some(page) = paginator.next_page().await? {
            pages.push(page);
        }
        Ok(pages)
    }

    #[tokio::test]
    async fn pages_through_1250_rows_in_windows_of_500() {
        let warehouse = MemoryWarehouse::new(1250);
        let mut paginator = PaginatorBuilder::new(session(&warehouse, options(500, None)))
            .build(&template());

        let pages = collect(&mut paginator).await.unwrap();

        let counts: Vec<_> = pages.iter().map(Page::record_count).collect();
        let offsets: Vec<_> = pages.iter().map(Page::offset).collect();
        assert_eq!(counts, vec![500, 500, 250]);
        assert_eq!(offsets, vec![0, 500, 1000]);
        assert!(pages.iter().all(|p| p.record_count() == p.records().len()));

        let summary = paginator.summary().unwrap();
        assert_eq!(summary.total_pages_processed, 3);
        assert_eq!(summary.total_records_processed, 1250);
        assert_eq!(warehouse.open_handles(), 0);
    }

    #[tokio::test]
    async fn page_count_is_ceil_of_rows_over_page_size() {
        for (rows, page_size) in [(0, 10), (1, 10), (10, 10), (11, 10), (999, 7)] {
            let warehouse = MemoryWarehouse::new(rows);
            let pages: Vec<Page> = into_stream(
                PaginatorBuilder::new(session(&warehouse, options(page_size, None)))
                    .build(&template()),
            )
            .try_collect()
            .await
            .unwrap();

            assert_eq!(pages.len(), rows.div_ceil(page_size), "rows={rows}");
            assert_eq!(pages.iter().map(Page::record_count).sum::<usize>(), rows);
            assert!(pages.iter().all(|p| p.record_count() <= page_size));
            assert!(
                pages
                    .windows(2)
                    .all(|w| w[1].offset() == w[0].offset() + page_size)
            );
        }
    }

    #[tokio::test]
    async fn ceiling_of_two_issues_no_third_fetch() {
        let warehouse = MemoryWarehouse::new(10 * 100);
        let mut paginator = PaginatorBuilder::new(session(&warehouse, options(100, Some(2))))
            .build(&template());

        let pages = collect(&mut paginator).await.unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(warehouse.offsets_read(), vec![0, 100]);
        assert_eq!(warehouse.open_handles(), 0);
    }

    #[tokio::test]
    async fn empty_page_ends_the_session() {
        let warehouse = MemoryWarehouse::new(200);
        let mut paginator = PaginatorBuilder::new(session(&warehouse, options(100, None)))
            .build(&template());

        collect(&mut paginator).await.unwrap();
        assert!(paginator.next_page().await.unwrap().is_none());

        assert_eq!(warehouse.offsets_read(), vec![0, 100, 200]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_per_page() {
        let warehouse = MemoryWarehouse::new(300);
        warehouse.fail_at(100, connection_reset());
        warehouse.fail_at(200, DbError::Unknown("statement timeout".into()));
        warehouse.fail_at(200, DbError::Unknown("statement timeout".into()));
        let started = Instant::now();

        let mut paginator = PaginatorBuilder::new(session(&warehouse, options(100, None)))
            .build(&template());
        let pages = collect(&mut paginator).await.unwrap();

        assert_eq!(pages.len(), 3);
        // page 2: one wait (100ms); page 3: two waits (100ms + 200ms)
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(400) && waited < Duration::from_millis(450));
        // the reset forced a reconnect
        assert_eq!(warehouse.connects(), 2);
        assert_eq!(paginator.summary().unwrap().error_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_the_original_failure() {
        let warehouse = MemoryWarehouse::new(300);
        for _ in 0..3 {
            warehouse.fail_at(100, DbError::Unknown("permission denied for table reviews".into()));
        }

        let mut paginator = PaginatorBuilder::new(session(&warehouse, options(100, None)))
            .build(&template());

        let first = paginator.next_page().await.unwrap();
        assert!(first.is_some());
        let err = paginator.next_page().await.unwrap_err();

        assert!(matches!(
            err,
            PageError::Query(DbError::Unknown(ref msg)) if msg == "permission denied for table reviews"
        ));
        assert_eq!(warehouse.offsets_read(), vec![0, 100, 100, 100]);
        assert_eq!(warehouse.open_handles(), 0);

        let summary = paginator.summary().unwrap();
        assert_eq!(summary.total_pages_processed, 1);
        assert_eq!(summary.error_count, 1);
        assert!(summary.errors[0].contains("permission denied"));
    }

    #[tokio::test(start_paused = true)]
    async fn refused_connections_are_retried() {
        let warehouse = MemoryWarehouse::new(50);
        warehouse.refuse_connects(2);

        let mut paginator = PaginatorBuilder::new(session(&warehouse, options(100, None)))
            .build(&template());
        let pages = collect(&mut paginator).await.unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(warehouse.connects(), 1);
    }

    #[tokio::test]
    async fn refused_connection_without_retry_is_a_connection_failure() {
        let warehouse = MemoryWarehouse::new(50);
        warehouse.refuse_connects(1);

        let mut paginator = PaginatorBuilder::new(session(&warehouse, options(100, None)))
            .without_retry()
            .build(&template());

        assert!(matches!(
            paginator.next_page().await,
            Err(PageError::Connection(ConnectorError::Other(_)))
        ));
    }

    #[tokio::test]
    async fn cached_pages_are_not_fetched_again() {
        let warehouse = MemoryWarehouse::new(250);
        let cache = memory_cache();
        let ctx = session(&warehouse, options(100, None)).with_cache(cache);

        let first = collect(&mut PaginatorBuilder::new(ctx.clone()).build(&template()))
            .await
            .unwrap();
        let fetched = warehouse.statements().len();

        let mut replay = PaginatorBuilder::new(ctx).build(&template());
        let second = collect(&mut replay).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(warehouse.statements().len(), fetched + 1);
        let summary = replay.summary().unwrap();
        assert_eq!(summary.cache_hits, 3);
        assert_eq!(summary.total_records_processed, 250);
    }

    #[tokio::test]
    async fn cache_hit_at_the_ceiling_releases_the_handle() {
        let warehouse = MemoryWarehouse::new(1000);
        let uncached = collect(
            &mut PaginatorBuilder::new(session(&warehouse, options(100, Some(2))))
                .build(&template()),
        )
        .await
        .unwrap();
        let cache = memory_cache();
        cache
            .put(&fingerprint(&template().bind_limit(100).text()), 2, &uncached[1])
            .await
            .unwrap();

        let warehouse = MemoryWarehouse::new(1000);
        let ctx = session(&warehouse, options(100, Some(2))).with_cache(cache);
        let mut paginator = PaginatorBuilder::new(ctx).build(&template());

        assert_eq!(paginator.next_page().await.unwrap().unwrap().offset(), 0);
        assert_eq!(warehouse.open_handles(), 1);
        assert_eq!(paginator.next_page().await.unwrap().unwrap().offset(), 100);

        // the paginator is still alive, so only an explicit release frees it
        assert_eq!(warehouse.open_handles(), 0);
        assert_eq!(warehouse.offsets_read(), vec![0]);
        assert_eq!(paginator.summary().unwrap().cache_hits, 1);
    }

    #[tokio::test]
    async fn changing_page_size_does_not_reuse_cached_pages() {
        let warehouse = MemoryWarehouse::new(250);
        let cache = memory_cache();

        let ctx = session(&warehouse, options(100, None)).with_cache(cache.clone());
        collect(&mut PaginatorBuilder::new(ctx).build(&template()))
            .await
            .unwrap();

        let ctx = session(&warehouse, options(50, None)).with_cache(cache);
        let mut paginator = PaginatorBuilder::new(ctx).build(&template());
        let pages = collect(&mut paginator).await.unwrap();

        assert_eq!(pages.len(), 5);
        assert!(pages.iter().all(|p| p.record_count() == 50));
        assert_eq!(paginator.summary().unwrap().cache_hits, 0);
    }

    #[tokio::test]
    async fn cache_respects_the_page_ceiling() {
        let warehouse = MemoryWarehouse::new(1000);
        let cache = memory_cache();
        let ctx = session(&warehouse, options(100, None)).with_cache(cache.clone());
        collect(&mut PaginatorBuilder::new(ctx).build(&template()))
            .await
            .unwrap();

        let ctx = session(&warehouse, options(100, Some(3))).with_cache(cache);
        let before = warehouse.statements().len();
        let pages = collect(&mut PaginatorBuilder::new(ctx).build(&template()))
            .await
            .unwrap();

        assert_eq!(pages.len(), 3);
        assert_eq!(warehouse.statements().len(), before);
    }

    #[tokio::test]
    async fn sled_cache_is_shared_between_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(SledCacheBackend::open(dir.path()).unwrap());
        let warehouse = MemoryWarehouse::new(120);

        for _ in 0..2 {
            let ctx = session(&warehouse, options(50, None))
                .with_cache(PageCache::new(backend.clone()).with_ttl(Duration::from_secs(60)));
            let pages = collect(&mut PaginatorBuilder::new(ctx).build(&template()))
                .await
                .unwrap();
            assert_eq!(pages.len(), 3);
        }

        // 3 pages and the empty fetch, then only the empty fetch
        assert_eq!(warehouse.statements().len(), 5);
    }

    #[tokio::test]
    async fn enriched_query_paginates_with_composed_columns() {
        let warehouse = MemoryWarehouse::new(30);
        let query = EnrichmentQuery::new("SELECT id, customer_id, body FROM reviews", "id")
            .with("sentiment", "ai_sentiment(body)")
            .with("summary", "ai_summarize(body)");

        let mut paginator = PaginatorBuilder::new(session(&warehouse, options(20, None)))
            .build_enriched(&query, &Postgres)
            .unwrap();
        let pages = collect(&mut paginator).await.unwrap();

        assert_eq!(pages.len(), 2);
        let statements = warehouse.statements();
        assert_eq!(
            statements[0],
            "WITH base_data AS (SELECT id, customer_id, body FROM reviews) \
             SELECT *, ai_sentiment(body) AS \"sentiment\", ai_summarize(body) AS \"summary\" \
             FROM base_data ORDER BY \"id\" LIMIT 20 OFFSET 0"
        );
        assert!(statements[1].ends_with("LIMIT 20 OFFSET 20"));
    }

    #[tokio::test]
    async fn partitioned_run_covers_every_row_once() {
        let warehouse = MemoryWarehouse::new(1250);
        let ctx = session(&warehouse, options(100, None));
        let ranges = partition(1250, NonZeroUsize::new(100).unwrap(), 4);
        let (tx, mut rx) = mpsc::channel(8);

        let consumer = tokio::spawn(async move {
            let mut ids = BTreeSet::new();
            while let Some(RangePage { range, page }) = rx.recv().await {
                assert!(page.offset() >= range.start && page.offset() < range.end);
                for record in page.records() {
                    assert!(ids.insert(record.get_value("id").as_i64().unwrap()));
                }
            }
            ids
        });

        let outcomes = run_partitioned(&ctx, &template(), ranges, tx).await;
        let ids = consumer.await.unwrap();

        assert_eq!(ids.len(), 1250);
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert_eq!(warehouse.connects(), 4);
        assert_eq!(warehouse.open_handles(), 0);
    }

    #[tokio::test]
    async fn failing_range_is_reported_without_cancelling_siblings() {
        let warehouse = MemoryWarehouse::new(400);
        for _ in 0..3 {
            warehouse.fail_at(200, DbError::Unknown("out of memory".into()));
        }
        let mut options = options(100, None);
        options.retry = None;
        let ctx = session(&warehouse, options);
        let (tx, mut rx) = mpsc::channel(8);
        let drain = tokio::spawn(async move {
            let mut pages = 0;
            while rx.recv().await.is_some() {
                pages += 1;
            }
            pages
        });

        let ranges = partition(400, NonZeroUsize::new(100).unwrap(), 2);
        let outcomes = run_partitioned(&ctx, &template(), ranges, tx).await;

        assert_eq!(drain.await.unwrap(), 2);
        let failed: Vec<_> = outcomes.iter().filter(|o| o.result.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].range.start, 200);
        let ok = outcomes.iter().find(|o| o.result.is_ok()).unwrap();
        assert_eq!(ok.result.as_ref().unwrap().total_records_processed, 200);
    }

    #[tokio::test]
    async fn dropping_a_paginator_mid_session_releases_its_handle() {
        let warehouse = MemoryWarehouse::new(1000);
        {
            let mut paginator = PaginatorBuilder::new(session(&warehouse, options(100, None)))
                .build(&template());
            paginator.next_page().await.unwrap();
            assert_eq!(warehouse.open_handles(), 1);
        }
        assert_eq!(warehouse.open_handles(), 0);
    }

    #[tokio::test]
    async fn settings_document_drives_a_session() {
        let settings = PagerSettings::from_json(
            r#"{
                "connection": { "driver": "pg", "url": "postgres://reader@warehouse/reviews" },
                "query": {
                    "base_query": "SELECT id, customer_id, body FROM reviews",
                    "sort_key": "id",
                    "enrichments": [{ "alias": "sentiment", "expression": "ai_sentiment(body)" }]
                },
                "pagination": { "page_size": 40, "max_pages": 2 },
                "retry": { "backoff_unit_ms": 10 }
            }"#,
        )
        .unwrap();
        let validated = settings.validate().unwrap();
        let template = validated.plan.template().unwrap();

        let warehouse = MemoryWarehouse::new(200);
        let ctx = SessionContext::new(warehouse.connector(), validated.options);
        let mut paginator = PaginatorBuilder::new(ctx).build(&template);
        let pages = collect(&mut paginator).await.unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(warehouse.offsets_read(), vec![0, 40]);
        assert!(
            warehouse
                .statements()
                .iter()
                .all(|sql| sql.contains(r#"ai_sentiment(body) AS "sentiment""#))
        );
        assert_eq!(paginator.summary().unwrap().total_records_processed, 80);
    }
}

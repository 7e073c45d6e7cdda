use stress_test::{stress_test_offline, stress_test_scaling, stress_test_sync};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async_main());
}

async fn async_main() {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            ASYNC STRESS TESTS                               ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: small scale
    let stats = stress_test_sync(4, 200).await;
    stats.print();

    // Test 2: offline editing, small scale
    let stats = stress_test_offline(4, 50).await;
    stats.print();

    // Test 3: medium scale
    let stats = stress_test_sync(20, 1000).await;
    stats.print();

    // Test 4: offline editing, medium scale
    let stats = stress_test_offline(20, 500).await;
    stats.print();

    // Test 5: Scaling analysis
    stress_test_scaling(40, 10).await;

    println!("\n✓ All stress tests completed successfully!");
}

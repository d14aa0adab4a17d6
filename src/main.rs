use stress_test::{stress_test_chain, stress_test_fanout, stress_test_scaling};
use tws_sdk::EngineError;

fn main() -> Result<(), EngineError> {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            PROPAGATION STRESS TESTS                        ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: short chain
    let stats = stress_test_chain(8, 200)?;
    stats.print();

    // Test 2: long chain
    let stats = stress_test_chain(64, 500)?;
    stats.print();

    // Test 3: wide fan-out from one input
    let stats = stress_test_fanout(128, 500)?;
    stats.print();

    // Test 4: scaling analysis
    stress_test_scaling(40, 10)?;

    println!("\n✓ All stress tests completed successfully!");
    Ok(())
}

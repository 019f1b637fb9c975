use prize_pool::planner::{spread_hours, HourWeights, SECS_PER_DAY};
use prize_pool::{Planner, ReleasePlan};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

const NOW: i64 = 1_700_000_000;

#[test]
fn test_thousand_over_ten_days() {
    let planner = Planner::default();
    let plan = planner.build(1_000, 10, NOW, &mut StdRng::seed_from_u64(10));

    assert_eq!(plan.total(), 1_000);
    assert!(plan.first_due().unwrap() >= NOW);
    assert!(plan.last_due().unwrap() < NOW + 10 * SECS_PER_DAY);

    let mut per_day = [0u64; 10];
    for event in plan.events() {
        per_day[((event.due_at - NOW) / SECS_PER_DAY) as usize] += event.quantity;
    }
    assert!(per_day.iter().all(|&d| d == 100));
}

#[test]
fn test_encoded_plan_survives_persistence() {
    let plan = Planner::default().build(250, 2, NOW, &mut StdRng::seed_from_u64(3));
    let decoded = ReleasePlan::decode(&plan.encode().unwrap()).unwrap();
    assert_eq!(decoded, plan);
}

proptest! {
    #[test]
    fn prop_build_conserves_total(
        total in 0u64..5_000,
        days in 0u32..15,
        offset_hours in -12i32..=14,
        now_shift in 0i64..SECS_PER_DAY,
        seed in any::<u64>(),
    ) {
        let planner = Planner::new(HourWeights::default(), offset_hours * 3_600).unwrap();
        let now = NOW + now_shift;
        let plan = planner.build(total, days, now, &mut StdRng::seed_from_u64(seed));

        prop_assert_eq!(plan.total(), total);
        prop_assert!(plan.events().iter().all(|e| e.quantity > 0));
        prop_assert!(plan.events().windows(2).all(|w| w[0].due_at <= w[1].due_at));
        if let (Some(first), Some(last)) = (plan.first_due(), plan.last_due()) {
            prop_assert!(first >= now);
            prop_assert!(last < now + i64::from(days.max(1)) * SECS_PER_DAY);
        }
    }

    #[test]
    fn prop_hour_spread_conserves_quantity(n in 0u64..20_000, seed in any::<u64>()) {
        let hours = spread_hours(n, &HourWeights::default(), &mut StdRng::seed_from_u64(seed));
        prop_assert_eq!(hours.iter().sum::<u64>(), n);
    }
}

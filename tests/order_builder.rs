use shop_catalog_api::{
    error::AppError,
    services::order_service::{PricedLine, order_total, pair_lines},
};
use uuid::Uuid;

fn priced(lines: &[(i32, i64)]) -> Vec<PricedLine> {
    lines
        .iter()
        .map(|&(quantity, price)| PricedLine {
            product_id: Uuid::new_v4(),
            quantity,
            price,
        })
        .collect()
}

#[test]
fn total_matches_sum_of_line_subtotals() {
    let cases: Vec<Vec<(i32, i64)>> = vec![
        vec![(1, 1000)],
        vec![(2, 1000), (3, 250)],
        vec![(10, 0), (1, 99_999), (7, 13)],
        (1..=50).map(|i| (i, i64::from(i) * 37)).collect(),
    ];

    for case in cases {
        let lines = priced(&case);
        let expected: i64 = lines
            .iter()
            .map(|l| i64::from(l.quantity) * l.price)
            .sum();
        assert_eq!(order_total(&lines).unwrap(), expected);
    }
}

#[test]
fn empty_order_has_no_lines_and_zero_total() {
    let lines = pair_lines(&[], &[]).unwrap();
    assert!(lines.is_empty());
    assert_eq!(order_total(&[]).unwrap(), 0);
}

#[test]
fn lines_keep_request_order_and_duplicates() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let lines = pair_lines(&[a, b, a], &[1, 2, 3]).unwrap();

    let pairs: Vec<(Uuid, i32)> = lines.iter().map(|l| (l.product_id, l.quantity)).collect();
    assert_eq!(pairs, vec![(a, 1), (b, 2), (a, 3)]);
}

#[test]
fn mismatched_lengths_fail_validation() {
    let err = pair_lines(&[Uuid::new_v4()], &[]).unwrap_err();
    match err {
        AppError::Validation(errors) => {
            assert_eq!(errors, vec!["product_ids has 1 entries but quantities has 0"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(matches!(
        pair_lines(&[], &[4]),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn zero_quantity_fails_validation() {
    assert!(matches!(
        pair_lines(&[Uuid::new_v4()], &[0]),
        Err(AppError::Validation(_))
    ));
}

use hrfs_core::{Edge, EdgeTrigger};
use rstest::rstest;

fn feed(t: &mut EdgeTrigger, seq: &[bool]) -> Vec<(usize, Edge)> {
    seq.iter()
        .enumerate()
        .filter_map(|(i, v)| t.set(*v).map(|e| (i, e)))
        .collect()
}

const SEQ: [bool; 5] = [true, true, false, false, true];

#[rstest]
fn reports_only_real_transitions() {
    let mut t = EdgeTrigger::new();
    assert_eq!(
        feed(&mut t, &SEQ),
        vec![
            (2, Edge { from: true, to: false }),
            (4, Edge { from: false, to: true }),
        ]
    );
}

#[rstest]
fn false_baseline_sees_two_rising_and_one_falling_edge() {
    let mut t = EdgeTrigger::with_value(false);
    assert_eq!(
        feed(&mut t, &SEQ),
        vec![
            (0, Edge { from: false, to: true }),
            (2, Edge { from: true, to: false }),
            (4, Edge { from: false, to: true }),
        ]
    );
    assert_eq!(t.get(), Some(true));
}

#[rstest]
#[case(false)]
#[case(true)]
fn known_baseline_reports_first_change(#[case] initial: bool) {
    let mut t = EdgeTrigger::with_value(initial);
    assert_eq!(
        t.set_logged("flag", !initial),
        Some(Edge {
            from: initial,
            to: !initial
        })
    );
    assert_eq!(t.set_logged("flag", !initial), None);
}

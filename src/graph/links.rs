use crate::core::column::EntityColumn;
use crate::core::error::EngineError;
use crate::graph::indexer::LabelIndex;
use crate::graph::regroup::{Node, Regrouping};
use crate::query::rows::{LinkRows, RawLink};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Regrouped links: `(source node, target node) -> summed volume`.
pub type LinkTotals = BTreeMap<(usize, usize), Decimal>;

/// Label ordinals of a raw link's two endpoints.
pub(crate) fn resolve_endpoints(
    index: &LabelIndex,
    rows: &LinkRows,
    link: &RawLink,
) -> Result<(usize, usize), EngineError> {
    let resolve = |column: &EntityColumn, label: &str| {
        index
            .position(column)
            .and_then(|p| index.ordinal(p, label))
            .ok_or_else(|| {
                EngineError::malformed(
                    &format!("{} -> {} links", rows.source, rows.target),
                    format!("'{}' is not among the {} labels", label, column),
                )
            })
    };
    Ok((
        resolve(&rows.source, &link.source)?,
        resolve(&rows.target, &link.target)?,
    ))
}

/// Add `volume` into `total`, failing instead of overflowing.
pub(crate) fn accumulate(
    total: &mut Decimal,
    volume: Decimal,
    context: impl FnOnce() -> String,
) -> Result<(), EngineError> {
    *total = total
        .checked_add(volume)
        .ok_or_else(|| EngineError::VolumeOverflow { context: context() })?;
    Ok(())
}

/// Sum raw links onto the regrouped nodes.
///
/// Links whose endpoints collapse into the same pair of nodes are summed
/// exactly; nothing is dropped. Output is ordered by `(source, target)`.
pub fn aggregate_links(
    index: &LabelIndex,
    regrouping: &Regrouping,
    links: &[LinkRows],
) -> Result<LinkTotals, EngineError> {
    let mut totals = LinkTotals::new();

    for rows in links {
        for link in &rows.links {
            let (source, target) = resolve_endpoints(index, rows, link)?;
            let pair = match (regrouping.remap(source), regrouping.remap(target)) {
                (Some(s), Some(t)) => (s, t),
                _ => {
                    return Err(EngineError::CorruptGraph(format!(
                        "link {} -> {} has an endpoint without a node",
                        link.source, link.target
                    )))
                }
            };
            accumulate(totals.entry(pair).or_insert(Decimal::ZERO), link.volume, || {
                format!("link {} -> {}", link.source, link.target)
            })?;
        }
    }
    Ok(totals)
}

/// Sum of link volumes touching each column, counting both roles.
/// Saturates at `Decimal::MAX`.
pub fn column_throughput(nodes: &[Node], totals: &LinkTotals) -> BTreeMap<String, Decimal> {
    let mut out = BTreeMap::new();
    for (&(s, t), &volume) in totals {
        for node in [s, t].iter().filter_map(|&i| nodes.get(i)) {
            let total = out.entry(node.column.to_string()).or_insert(Decimal::ZERO);
            *total = total.saturating_add(volume);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::rows::LabelSet;
    use rust_decimal_macros::dec;

    fn col(name: &str) -> EntityColumn {
        EntityColumn::new(name)
    }

    fn link(source: &str, target: &str, volume: Decimal) -> RawLink {
        RawLink {
            source: source.into(),
            target: target.into(),
            volume,
        }
    }

    fn fixture() -> (LabelIndex, Vec<LinkRows>) {
        let index = LabelIndex::build(&[
            LabelSet::new(col("frontend"), vec!["a".into(), "b".into(), "c".into()]),
            LabelSet::new(col("metaaggregator"), vec!["m".into()]),
            LabelSet::new(col("solver"), vec!["s".into()]),
        ]);
        let links = vec![
            LinkRows {
                source: col("frontend"),
                target: col("metaaggregator"),
                links: vec![link("a", "m", dec!(10)), link("b", "m", dec!(0.1))],
            },
            LinkRows {
                source: col("frontend"),
                target: col("solver"),
                links: vec![link("c", "s", dec!(0.2)), link("a", "s", dec!(4))],
            },
        ];
        (index, links)
    }

    #[test]
    fn test_tail_links_merge_exactly() {
        let (index, links) = fixture();
        let r = Regrouping::compute(&index, &links, 1).unwrap();
        let totals = aggregate_links(&index, &r, &links).unwrap();

        // nodes: a, Other (frontend), m, s
        assert_eq!(r.labels(), vec!["a", "Other (frontend)", "m", "s"]);
        assert_eq!(totals.get(&(0, 2)), Some(&dec!(10)));
        assert_eq!(totals.get(&(1, 2)), Some(&dec!(0.1)));
        assert_eq!(totals.get(&(1, 3)), Some(&dec!(0.2)));
        assert_eq!(totals.get(&(0, 3)), Some(&dec!(4)));
        assert_eq!(totals.values().copied().sum::<Decimal>(), dec!(14.3));
    }

    #[test]
    fn test_output_is_ordered_by_pair() {
        let (index, links) = fixture();
        let r = Regrouping::compute(&index, &links, 20).unwrap();
        let totals = aggregate_links(&index, &r, &links).unwrap();
        let pairs: Vec<_> = totals.keys().copied().collect();
        let mut sorted = pairs.clone();
        sorted.sort();
        assert_eq!(pairs, sorted);
    }

    #[test]
    fn test_throughput_per_column() {
        let (index, links) = fixture();
        let r = Regrouping::compute(&index, &links, 20).unwrap();
        let totals = aggregate_links(&index, &r, &links).unwrap();
        let throughput = column_throughput(r.nodes(), &totals);
        assert_eq!(throughput["frontend"], dec!(14.3));
        assert_eq!(throughput["metaaggregator"], dec!(10.1));
        assert_eq!(throughput["solver"], dec!(4.2));
    }

    #[test]
    fn test_overflowing_pair_is_an_error() {
        let (index, mut links) = fixture();
        let r = Regrouping::compute(&index, &links, 20).unwrap();
        let big = Decimal::from_scientific("5e28").unwrap();
        links[0].links = vec![link("a", "m", big), link("a", "m", big)];
        let err = aggregate_links(&index, &r, &links).unwrap_err();
        assert!(matches!(err, EngineError::VolumeOverflow { .. }));
    }

    #[test]
    fn test_throughput_saturates() {
        let (index, links) = fixture();
        let r = Regrouping::compute(&index, &links, 20).unwrap();
        let mut totals = LinkTotals::new();
        totals.insert((0, 3), Decimal::MAX);
        totals.insert((1, 3), Decimal::MAX);
        let throughput = column_throughput(r.nodes(), &totals);
        assert_eq!(throughput["frontend"], Decimal::MAX);
    }

    #[test]
    fn test_unresolved_endpoint_is_reported() {
        let (index, mut links) = fixture();
        let r = Regrouping::compute(&index, &links, 20).unwrap();
        links[1].links.push(link("a", "nobody", dec!(1)));
        let err = aggregate_links(&index, &r, &links).unwrap_err();
        assert!(err.to_string().contains("nobody"));
    }
}

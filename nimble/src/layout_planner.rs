use std::collections::HashMap;

use nimble_error::{NimbleResult, nimble_bail};
use nimble_schema::{SchemaNode, StreamOffset};
use nimble_tablet::StripeStream;

/// Reorders a stripe's streams for locality.
///
/// The plan puts the root struct's nulls first, then the configured flat-map
/// columns: for each one its nulls stream, then every requested feature's
/// in-map stream followed by that feature's whole value subtree. All
/// remaining streams follow in schema preorder. Streams are emitted at most
/// once; the output is always a permutation of the input.
pub struct FlatMapLayoutPlanner {
    /// `(column ordinal, ordered feature names)` per configured flat map.
    feature_order: Vec<(usize, Vec<String>)>,
}

impl FlatMapLayoutPlanner {
    pub fn new(feature_order: Vec<(usize, Vec<String>)>) -> Self {
        Self { feature_order }
    }

    /// The schema-preorder plan with no flat-map preferences.
    pub fn schema_order() -> Self {
        Self::new(Vec::new())
    }

    pub fn plan(
        &self,
        schema: &SchemaNode,
        streams: Vec<StripeStream>,
    ) -> NimbleResult<Vec<StripeStream>> {
        let SchemaNode::Row {
            nulls: root_nulls,
            names,
            children,
        } = schema
        else {
            nimble_bail!(InvalidLayoutRequest: "layout planning requires a struct schema root");
        };

        // The configured flat-map streams, in config order.
        let mut ordered: Vec<StreamOffset> = Vec::new();
        for (ordinal, features) in &self.feature_order {
            let Some(column) = children.get(*ordinal) else {
                nimble_bail!(
                    InvalidLayoutRequest: "column ordinal {} for feature ordering is out of range ({} columns)",
                    ordinal,
                    children.len()
                );
            };
            let SchemaNode::FlatMap {
                nulls,
                children: map_children,
            } = column
            else {
                nimble_bail!(
                    InvalidLayoutRequest: "column '{}' for feature ordering is not a flat map",
                    names.get(*ordinal).map(String::as_str).unwrap_or("?")
                );
            };
            ordered.push(*nulls);

            let by_name: HashMap<&str, usize> = map_children
                .iter()
                .enumerate()
                .map(|(i, child)| (child.name.as_str(), i))
                .collect();
            for feature in features {
                // Features absent from the schema are silently skipped.
                let Some(ordinal) = by_name.get(feature.as_str()) else {
                    continue;
                };
                let child = &map_children[*ordinal];
                ordered.push(child.in_map);
                child.value.append_stream_offsets(&mut ordered);
            }
        }

        let mut by_offset: HashMap<StreamOffset, StripeStream> =
            streams.into_iter().map(|s| (s.id, s)).collect();
        let input_len = by_offset.len();
        let mut layout = Vec::with_capacity(input_len);
        let mut try_append = |offset: StreamOffset, layout: &mut Vec<StripeStream>| {
            if let Some(stream) = by_offset.remove(&offset) {
                layout.push(stream);
            }
        };

        // Root nulls first, then the ordered flat maps, then everything else
        // in schema preorder; removal from the map de-duplicates.
        try_append(*root_nulls, &mut layout);
        for offset in &ordered {
            try_append(*offset, &mut layout);
        }
        for offset in schema.stream_offsets() {
            try_append(offset, &mut layout);
        }

        if layout.len() != input_len {
            nimble_bail!(
                "stream count mismatch after planning: input {}, output {}",
                input_len,
                layout.len()
            );
        }
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use nimble_schema::{FlatMapChild, ScalarKind};

    use super::*;

    fn stream(id: StreamOffset) -> StripeStream {
        StripeStream {
            id,
            content: vec![id as u8],
        }
    }

    fn flat_map_schema() -> SchemaNode {
        SchemaNode::Row {
            nulls: 0,
            names: vec!["a".into(), "features".into()],
            children: vec![
                SchemaNode::Scalar {
                    kind: ScalarKind::Int32,
                    values: 1,
                },
                SchemaNode::FlatMap {
                    nulls: 2,
                    children: vec![
                        FlatMapChild {
                            name: "x".into(),
                            in_map: 3,
                            value: SchemaNode::Scalar {
                                kind: ScalarKind::Int64,
                                values: 4,
                            },
                        },
                        FlatMapChild {
                            name: "y".into(),
                            in_map: 5,
                            value: SchemaNode::Scalar {
                                kind: ScalarKind::Int64,
                                values: 6,
                            },
                        },
                    ],
                },
            ],
        }
    }

    fn ids(streams: &[StripeStream]) -> Vec<StreamOffset> {
        streams.iter().map(|s| s.id).collect()
    }

    #[test]
    fn requested_features_come_first() {
        let planner = FlatMapLayoutPlanner::new(vec![(1, vec!["y".into(), "absent".into()])]);
        let streams = (0..7).map(stream).collect();
        let planned = planner.plan(&flat_map_schema(), streams).unwrap();
        // Root nulls, flat-map nulls, y's in-map + values, then preorder rest.
        assert_eq!(ids(&planned), vec![0, 2, 5, 6, 1, 3, 4]);
    }

    #[test]
    fn schema_order_without_config() {
        let planner = FlatMapLayoutPlanner::schema_order();
        let streams = (0..7).rev().map(stream).collect();
        let planned = planner.plan(&flat_map_schema(), streams).unwrap();
        assert_eq!(ids(&planned), vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn output_is_a_permutation() {
        let planner = FlatMapLayoutPlanner::new(vec![(1, vec!["x".into(), "y".into()])]);
        let streams: Vec<_> = [4u32, 0, 6, 2, 5, 1, 3].into_iter().map(stream).collect();
        let planned = planner.plan(&flat_map_schema(), streams).unwrap();
        let mut sorted = ids(&planned);
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn partial_stripes_are_allowed() {
        // A stripe may omit streams (e.g. all-null columns).
        let planner = FlatMapLayoutPlanner::new(vec![(1, vec!["x".into()])]);
        let streams = vec![stream(0), stream(4), stream(1)];
        let planned = planner.plan(&flat_map_schema(), streams).unwrap();
        assert_eq!(ids(&planned), vec![0, 4, 1]);
    }

    #[test]
    fn non_flat_map_column_rejected() {
        let planner = FlatMapLayoutPlanner::new(vec![(0, vec!["x".into()])]);
        let err = planner
            .plan(&flat_map_schema(), (0..7).map(stream).collect())
            .unwrap_err();
        assert!(matches!(
            err,
            nimble_error::NimbleError::InvalidLayoutRequest(_)
        ));
    }

    #[test]
    fn out_of_range_ordinal_rejected() {
        let planner = FlatMapLayoutPlanner::new(vec![(9, vec![])]);
        assert!(planner
            .plan(&flat_map_schema(), (0..7).map(stream).collect())
            .is_err());
    }
}

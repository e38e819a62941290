// Integration tests for CFG construction
mod utils;

#[cfg(test)]
mod tests {
    use super::utils::*;
    use ion_core::backend::analysis::CfgConstructor;
    use ion_core::backend::error::IonError;
    use ion_core::backend::ir::EdgeKind;
    use ion_core::backend::parser::parse_function;

    #[test]
    fn test_wires_loop_with_conditional_exit() {
        let func = build(COUNTING_LOOP);
        assert_eq!(func.len(), 4);

        // entry -> header
        assert!(has_edge(&func, 0, 1));
        assert_eq!(func.blocks()[0].successors().len(), 1);

        // header -> exit (taken), header -> body (fallthrough)
        assert_eq!(func.blocks()[1].successors(), &[3, 2]);
        assert!(has_edge(&func, 1, 3));
        assert!(has_edge(&func, 1, 2));

        // body -> header
        assert!(has_edge(&func, 2, 1));
        assert_eq!(func.blocks()[2].successors().len(), 1);

        assert!(func.blocks()[3].successors().is_empty());
        assert_reciprocal(&func);
    }

    #[test]
    fn test_edge_kinds_follow_terminators() {
        let func = build(COUNTING_LOOP);
        let kinds: Vec<_> = func.edges().iter().map(|e| (e.from, e.to, e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (0, 1, EdgeKind::Jump),
                (1, 3, EdgeKind::Taken),
                (1, 2, EdgeKind::Fallthrough),
                (2, 1, EdgeKind::Jump),
            ]
        );
    }

    #[test]
    fn test_missing_label_is_reported() {
        let mut func = parse_function("test", "entry:\n  JMP nonexistent_label\n").unwrap();
        let err = CfgConstructor::construct(&mut func).unwrap_err();
        assert!(matches!(err, IonError::UnresolvedLabel { block: 0, .. }));
        assert!(err.to_string().contains("nonexistent_label"));
    }

    #[test]
    fn test_only_last_instruction_decides_successors() {
        let func = build(DIAMOND);
        // MAIN_BLOCK ends with JMP COND_2, so the earlier BEQ adds nothing
        assert_eq!(func.blocks()[1].successors(), &[3]);
        assert!(func.blocks()[2].predecessors().is_empty());
        assert_eq!(func.blocks()[4].predecessors(), &[2, 3]);
        assert_reciprocal(&func);
    }

    #[test]
    fn test_branch_to_physical_next_block() {
        let func = build(STRAIGHT_LINE_DAG);
        assert_eq!(func.blocks()[1].successors(), &[2, 2]);
        assert_eq!(func.blocks()[2].predecessors(), &[1, 1]);
        assert_reciprocal(&func);
    }

    #[test]
    fn test_nested_loop_shape() {
        let func = build(NESTED_LOOP);
        assert_reciprocal(&func);
        let back: Vec<_> = CfgConstructor::back_edges(&func)
            .iter()
            .map(|e| (e.from, e.to))
            .collect();
        assert_eq!(back, vec![(2, 1), (4, 3)]);

        let rpo = CfgConstructor::reverse_postorder(&func);
        assert_eq!(rpo.len(), func.len());
        assert_eq!(rpo[0], 0);
        assert_eq!(*rpo.last().unwrap(), 5);
    }

    #[test]
    fn test_dump_matches_graph() {
        let func = build(SIMPLE_LOOP);
        assert_eq!(
            CfgConstructor::dump_cfg(&func),
            "bb0 (INIT_BLOCK) -> [1]\n\
             bb1 (main_block) -> [3, 2]\n\
             bb2 (BLOCK_A) -> [1]\n\
             bb3 (BLOCK_C) -> []\n"
        );
    }
}

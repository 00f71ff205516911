use tracing::debug;

use crate::catalog::{CatalogStore, Product, ProductId};

/// Product ids the user has marked, in the order they were picked.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SelectionSet {
    ids: Vec<ProductId>,
}

impl SelectionSet {
    pub fn contains(&self, id: ProductId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &[ProductId] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Flip membership. Returns whether `id` is selected afterwards.
    fn toggle(&mut self, id: ProductId) -> bool {
        if let Some(pos) = self.ids.iter().position(|&x| x == id) {
            self.ids.remove(pos);
            false
        } else {
            self.ids.push(id);
            true
        }
    }

    /// Resolve against the catalog, silently skipping stale ids.
    pub fn resolve<'a>(&self, catalog: &'a CatalogStore) -> Vec<&'a Product> {
        self.ids.iter().filter_map(|&id| catalog.find(id)).collect()
    }
}

/// Which cards have their description expanded. View state only; it never
/// affects the selection and survives every re-render.
#[derive(Debug, Default, Clone)]
pub struct ExpandState {
    ids: Vec<ProductId>,
}

impl ExpandState {
    pub fn is_expanded(&self, id: ProductId) -> bool {
        self.ids.contains(&id)
    }

    fn toggle(&mut self, id: ProductId) -> bool {
        if let Some(pos) = self.ids.iter().position(|&x| x == id) {
            self.ids.remove(pos);
            false
        } else {
            self.ids.push(id);
            true
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Space,
    Other,
}

impl Key {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Enter" => Key::Enter,
            " " | "Space" | "Spacebar" => Key::Space,
            _ => Key::Other,
        }
    }
}

/// A user input on the product grid or the selected-items list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Pointer click on a card. `nested_control` is set when the click landed
    /// on a button inside the card.
    CardClick { id: ProductId, nested_control: bool },
    /// Keydown while a card (or something inside it) has focus.
    CardKey {
        id: ProductId,
        key: Key,
        nested_control: bool,
    },
    ExpandClick { id: ProductId },
    RemoveClick { id: ProductId },
}

/// What the view has to redraw after an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Selection changed: grid indicators and the selected list both rerender.
    SelectionChanged { id: ProductId, selected: bool },
    ExpandChanged { id: ProductId, expanded: bool },
}

/// Turns inputs into store mutations. Owns the selection and the expand
/// view-state for the page session.
#[derive(Debug, Default)]
pub struct SelectionController {
    selection: SelectionSet,
    expanded: ExpandState,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn expanded(&self) -> &ExpandState {
        &self.expanded
    }

    pub fn toggle(&mut self, id: ProductId) -> Effect {
        let selected = self.selection.toggle(id);
        debug!(id, selected, "selection toggled");
        Effect::SelectionChanged { id, selected }
    }

    pub fn handle(&mut self, input: Input) -> Option<Effect> {
        match input {
            Input::CardClick {
                nested_control: true,
                ..
            } => None,
            Input::CardClick { id, .. } => Some(self.toggle(id)),
            Input::CardKey {
                id,
                key: Key::Enter | Key::Space,
                nested_control: false,
            } => Some(self.toggle(id)),
            Input::CardKey { .. } => None,
            Input::ExpandClick { id } => {
                let expanded = self.expanded.toggle(id);
                Some(Effect::ExpandChanged { id, expanded })
            }
            Input::RemoveClick { id } => Some(self.toggle(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sample_product;
    use crate::render;

    fn catalog() -> CatalogStore {
        CatalogStore::from_products(vec![
            sample_product(1, "Cleanser", "cleanser"),
            sample_product(2, "Shampoo", "haircare"),
            sample_product(3, "Moisturizer", "moisturizer"),
            sample_product(4, "Conditioner", "haircare"),
        ])
    }

    #[test]
    fn test_toggle_twice_is_noop_on_set() {
        let mut ctl = SelectionController::new();
        let first = ctl.toggle(2);
        let second = ctl.toggle(2);
        assert_eq!(first, Effect::SelectionChanged { id: 2, selected: true });
        assert_eq!(second, Effect::SelectionChanged { id: 2, selected: false });
        assert!(ctl.selection().is_empty());
    }

    #[test]
    fn test_nested_controls_do_not_toggle() {
        let mut ctl = SelectionController::new();
        assert_eq!(ctl.handle(Input::CardClick { id: 1, nested_control: true }), None);
        assert_eq!(
            ctl.handle(Input::CardKey { id: 1, key: Key::Enter, nested_control: true }),
            None
        );
        assert_eq!(
            ctl.handle(Input::CardKey { id: 1, key: Key::Other, nested_control: false }),
            None
        );
        assert!(ctl.selection().is_empty());

        ctl.handle(Input::CardKey { id: 1, key: Key::Space, nested_control: false });
        assert!(ctl.selection().contains(1));
    }

    #[test]
    fn test_expand_is_independent_of_selection() {
        let mut ctl = SelectionController::new();
        ctl.handle(Input::ExpandClick { id: 3 });
        assert!(ctl.expanded().is_expanded(3));
        assert!(ctl.selection().is_empty());

        ctl.handle(Input::CardClick { id: 3, nested_control: false });
        ctl.handle(Input::CardClick { id: 3, nested_control: false });
        assert!(ctl.expanded().is_expanded(3));
    }

    #[test]
    fn test_remove_routes_through_toggle() {
        let mut ctl = SelectionController::new();
        ctl.handle(Input::CardClick { id: 4, nested_control: false });
        let effect = ctl.handle(Input::RemoveClick { id: 4 });
        assert_eq!(effect, Some(Effect::SelectionChanged { id: 4, selected: false }));
        assert!(!ctl.selection().contains(4));
    }

    #[test]
    fn test_stale_ids_are_skipped_on_resolve() {
        let store = catalog();
        let mut ctl = SelectionController::new();
        ctl.toggle(42);
        ctl.toggle(1);
        let resolved: Vec<_> = ctl.selection().resolve(&store).iter().map(|p| p.id).collect();
        assert_eq!(resolved, vec![1]);
    }

    #[test]
    fn test_grid_and_list_agree_after_every_toggle() {
        let store = catalog();
        let mut ctl = SelectionController::new();
        let sequence = [1, 3, 1, 4, 2, 2, 99, 3, 4, 1];

        for id in sequence {
            ctl.toggle(id);
            let mut grid = render::grid_selection(store.all(), ctl.selection());
            let mut list: Vec<_> = ctl.selection().resolve(&store).iter().map(|p| p.id).collect();
            grid.sort();
            list.sort();
            assert_eq!(grid, list, "after toggling {id}");
        }
    }
}

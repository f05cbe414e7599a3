use super::ViewportId;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolName {
    /// Moves through images or frames.
    StackScroll,
    Zoom,
    /// Starts and stops cine playback.
    PlayClip,
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolName::StackScroll => "StackScroll",
            ToolName::Zoom => "Zoom",
            ToolName::PlayClip => "PlayClip",
        };
        f.write_str(name)
    }
}

/// Input a tool can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    Primary,
    Secondary,
    Wheel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolMode {
    Active,
    #[default]
    Passive,
}

/// Per-tool settings. Unset fields keep their previous value when merged.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ToolOptions {
    pub invert: Option<bool>,
    pub loop_around: Option<bool>,
    pub sensitivity: Option<f32>,
}

impl ToolOptions {
    fn merge(&mut self, other: ToolOptions) {
        self.invert = other.invert.or(self.invert);
        self.loop_around = other.loop_around.or(self.loop_around);
        self.sensitivity = other.sensitivity.or(self.sensitivity);
    }
}

#[derive(Debug, Clone, Default)]
struct ToolState {
    mode: ToolMode,
    bindings: Vec<Binding>,
    options: ToolOptions,
}

/// Input bindings shared by a set of viewports.
#[derive(Debug)]
pub struct ToolGroup {
    id: String,
    tools: BTreeMap<ToolName, ToolState>,
    viewports: Vec<ViewportId>,
}

impl ToolGroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tools: BTreeMap::new(),
            viewports: Vec::new(),
        }
    }

    /// Tools start passive.
    pub fn add_tool(&mut self, name: ToolName) {
        self.tools.entry(name).or_default();
    }

    pub fn add_viewport(&mut self, viewport_id: ViewportId) {
        if !self.viewports.contains(&viewport_id) {
            self.viewports.push(viewport_id);
        }
    }

    pub fn remove_viewport(&mut self, viewport_id: &ViewportId) {
        self.viewports.retain(|id| id != viewport_id);
    }

    pub fn remove_viewports(&mut self) {
        self.viewports.clear();
    }

    pub fn viewports(&self) -> &[ViewportId] {
        &self.viewports
    }

    /// Activates `name` on `bindings`. A binding belongs to one active tool
    /// at a time, so other tools lose it.
    pub fn set_tool_active(&mut self, name: ToolName, bindings: &[Binding]) {
        if !self.tools.contains_key(&name) {
            log::warn!("{}: tool {name} was not added to the group", self.id);
            return;
        }
        for (other, state) in self.tools.iter_mut() {
            if *other != name {
                state.bindings.retain(|binding| !bindings.contains(binding));
            }
        }
        if let Some(state) = self.tools.get_mut(&name) {
            state.mode = ToolMode::Active;
            state.bindings = bindings.to_vec();
        }
    }

    pub fn set_tool_passive(&mut self, name: ToolName) {
        if let Some(state) = self.tools.get_mut(&name) {
            state.mode = ToolMode::Passive;
            state.bindings.clear();
        }
    }

    pub fn set_tool_configuration(&mut self, name: ToolName, options: ToolOptions) {
        if let Some(state) = self.tools.get_mut(&name) {
            state.options.merge(options);
        }
    }

    #[cfg(test)]
    pub fn tool_mode(&self, name: ToolName) -> Option<ToolMode> {
        self.tools.get(&name).map(|state| state.mode)
    }

    pub fn tool_options(&self, name: ToolName) -> ToolOptions {
        self.tools
            .get(&name)
            .map(|state| state.options)
            .unwrap_or_default()
    }

    /// The active tool bound to `binding`, if any.
    pub fn tool_for(&self, binding: Binding) -> Option<ToolName> {
        self.tools.iter().find_map(|(name, state)| {
            (state.mode == ToolMode::Active && state.bindings.contains(&binding)).then_some(*name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> ToolGroup {
        let mut group = ToolGroup::new("tools");
        group.add_tool(ToolName::StackScroll);
        group.add_tool(ToolName::Zoom);
        group.add_tool(ToolName::PlayClip);
        group
    }

    #[test]
    fn added_tools_are_passive() {
        let group = group();
        assert_eq!(group.tool_mode(ToolName::Zoom), Some(ToolMode::Passive));
        assert_eq!(group.tool_for(Binding::Wheel), None);
    }

    #[test]
    fn active_tools_answer_their_bindings() {
        let mut group = group();
        group.set_tool_active(ToolName::StackScroll, &[Binding::Wheel]);
        group.set_tool_active(ToolName::Zoom, &[Binding::Secondary]);

        assert_eq!(group.tool_for(Binding::Wheel), Some(ToolName::StackScroll));
        assert_eq!(group.tool_for(Binding::Secondary), Some(ToolName::Zoom));
        assert_eq!(group.tool_for(Binding::Primary), None);
    }

    #[test]
    fn rebinding_moves_the_binding() {
        let mut group = group();
        group.set_tool_active(ToolName::StackScroll, &[Binding::Wheel, Binding::Primary]);
        group.set_tool_active(ToolName::PlayClip, &[Binding::Primary]);

        assert_eq!(group.tool_for(Binding::Primary), Some(ToolName::PlayClip));
        assert_eq!(group.tool_for(Binding::Wheel), Some(ToolName::StackScroll));

        group.set_tool_passive(ToolName::PlayClip);
        assert_eq!(group.tool_for(Binding::Primary), None);
    }

    #[test]
    fn tools_outside_the_group_cannot_be_activated() {
        let mut group = ToolGroup::new("empty");
        group.set_tool_active(ToolName::Zoom, &[Binding::Secondary]);
        assert_eq!(group.tool_for(Binding::Secondary), None);
    }

    #[test]
    fn configuration_merges() {
        let mut group = group();
        group.set_tool_configuration(
            ToolName::StackScroll,
            ToolOptions {
                invert: Some(true),
                ..Default::default()
            },
        );
        group.set_tool_configuration(
            ToolName::StackScroll,
            ToolOptions {
                loop_around: Some(true),
                ..Default::default()
            },
        );
        let options = group.tool_options(ToolName::StackScroll);
        assert_eq!(options.invert, Some(true));
        assert_eq!(options.loop_around, Some(true));
        assert_eq!(options.sensitivity, None);
    }

    #[test]
    fn viewports_are_tracked_once() {
        let mut group = group();
        group.add_viewport(ViewportId::new("a"));
        group.add_viewport(ViewportId::new("a"));
        group.add_viewport(ViewportId::new("b"));
        assert_eq!(group.viewports().len(), 2);

        group.remove_viewport(&ViewportId::new("a"));
        assert_eq!(group.viewports(), &[ViewportId::new("b")]);
        group.remove_viewports();
        assert!(group.viewports().is_empty());
    }
}

use crate::{
    color::Color,
    error::SetupError,
    model::FixtureModel,
    Result, ShowError,
};

/// Index of a model in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(pub usize);

/// Index of a fixture in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixtureId(pub usize);

/// Index of a group in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub usize);

/// One physical DMX-addressable unit.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub name: String,
    pub address: u16,
    pub universe: u8,
    pub channel_mode: u8,
    pub model: ModelId,
    pub color: Color,
    pub brightness: u8,
    pub tilt: f32,
    pub pan: f32,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub members: Vec<FixtureId>,
}

/// Arena tables for models, fixtures and groups.
///
/// Lookups by name are linear scans from the back, so when names are
/// duplicated the most recent registration wins.
#[derive(Debug)]
pub struct Registry {
    models: Vec<FixtureModel>,
    fixtures: Vec<Fixture>,
    groups: Vec<Group>,
    max_models: usize,
    max_fixtures: usize,
    setup_closed: bool,
}

impl Registry {
    pub fn new(max_models: usize, max_fixtures: usize) -> Self {
        Self {
            models: Vec::new(),
            fixtures: Vec::new(),
            groups: Vec::new(),
            max_models,
            max_fixtures,
            setup_closed: false,
        }
    }

    pub fn register_model(&mut self, model: FixtureModel) -> Result<ModelId> {
        self.ensure_open("register_model")?;
        if self.models.len() >= self.max_models {
            return Err(SetupError::TooManyModels(self.max_models).into());
        }
        self.models.push(model);
        Ok(ModelId(self.models.len() - 1))
    }

    pub fn register_fixture(
        &mut self,
        name: &str,
        model: ModelId,
        address: u16,
        universe: u8,
        channel_mode: u8,
    ) -> Result<FixtureId> {
        self.ensure_open("register_fixture")?;
        if self.fixtures.len() >= self.max_fixtures {
            return Err(SetupError::TooManyFixtures(self.max_fixtures).into());
        }
        if model.0 >= self.models.len() {
            return Err(ShowError::msg(format!(
                "model id {} is not registered",
                model.0
            )));
        }
        self.fixtures.push(Fixture {
            name: name.to_string(),
            address,
            universe,
            channel_mode,
            model,
            color: Color::BLACK,
            brightness: 0,
            tilt: 0.0,
            pan: 0.0,
        });
        Ok(FixtureId(self.fixtures.len() - 1))
    }

    /// Registers a group. Every member must already exist; on failure nothing
    /// is registered.
    pub fn register_group<S: AsRef<str>>(&mut self, name: &str, members: &[S]) -> Result<GroupId> {
        self.ensure_open("register_group")?;
        let members = members
            .iter()
            .enumerate()
            .map(|(index, member)| {
                self.find_fixture(member.as_ref()).ok_or_else(|| {
                    ShowError::from(SetupError::UnknownFixture {
                        group: name.to_string(),
                        fixture: member.as_ref().to_string(),
                        index: index + 1,
                    })
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.groups.push(Group {
            name: name.to_string(),
            members,
        });
        Ok(GroupId(self.groups.len() - 1))
    }

    pub fn close_setup(&mut self) {
        self.setup_closed = true;
    }

    pub fn is_setup_closed(&self) -> bool {
        self.setup_closed
    }

    pub fn find_model(&self, name: &str) -> Option<ModelId> {
        self.models.iter().rposition(|m| m.name == name).map(ModelId)
    }

    pub fn find_fixture(&self, name: &str) -> Option<FixtureId> {
        self.fixtures
            .iter()
            .rposition(|f| f.name == name)
            .map(FixtureId)
    }

    pub fn find_group(&self, name: &str) -> Option<GroupId> {
        self.groups.iter().rposition(|g| g.name == name).map(GroupId)
    }

    pub fn model(&self, id: ModelId) -> &FixtureModel {
        &self.models[id.0]
    }

    pub fn fixture(&self, id: FixtureId) -> &Fixture {
        &self.fixtures[id.0]
    }

    pub fn fixture_mut(&mut self, id: FixtureId) -> &mut Fixture {
        &mut self.fixtures[id.0]
    }

    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    /// Model of the given fixture.
    pub fn model_of(&self, id: FixtureId) -> &FixtureModel {
        self.model(self.fixture(id).model)
    }

    pub fn models(&self) -> &[FixtureModel] {
        &self.models
    }

    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.setup_closed {
            Err(ShowError::SetupClosed { operation })
        } else {
            Ok(())
        }
    }
}

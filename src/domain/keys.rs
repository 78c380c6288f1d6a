use uuid::Uuid;

// Store key layout. Every key is namespaced by a configurable prefix.
#[derive(Clone, Debug)]
pub struct KeySpace {
    prefix: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("gens")
    }
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn generator(&self, id: &str) -> String {
        format!("{}:gen:{id}", self.prefix)
    }

    pub fn generator_prefix(&self) -> String {
        format!("{}:gen:", self.prefix)
    }

    pub fn lock(&self, id: &str) -> String {
        format!("{}:lock:{id}", self.prefix)
    }

    pub fn lock_prefix(&self) -> String {
        format!("{}:lock:", self.prefix)
    }

    pub fn owner_world(&self, owner: &Uuid, world: &str) -> String {
        format!("{}:owner:{owner}:{world}", self.prefix)
    }

    pub fn owner_worlds(&self, owner: &Uuid) -> String {
        format!("{}:owner-worlds:{owner}", self.prefix)
    }

    pub fn world(&self, world: &str) -> String {
        format!("{}:world:{world}", self.prefix)
    }

    pub fn owner_count(&self, owner: &Uuid) -> String {
        format!("{}:count:{owner}", self.prefix)
    }

    pub fn owners(&self) -> String {
        format!("{}:owners", self.prefix)
    }

    pub fn worlds(&self) -> String {
        format!("{}:worlds", self.prefix)
    }

    pub fn user(&self, id: &Uuid) -> String {
        format!("{}:user:{id}", self.prefix)
    }

    pub fn user_name(&self, name: &str) -> String {
        format!("{}:user-name:{}", self.prefix, name.to_lowercase())
    }

    pub fn users(&self) -> String {
        format!("{}:users", self.prefix)
    }
}

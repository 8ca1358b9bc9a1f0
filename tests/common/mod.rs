#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use gpu_devbox::runtime::{BuildRequest, ContainerRuntime, ContainerSpec, ContainerState};
use gpu_devbox::Settings;

/// In-memory daemon: one optional container, a set of images and volumes.
#[derive(Default)]
pub struct FakeRuntime {
    pub images: RefCell<BTreeSet<String>>,
    pub volumes: RefCell<BTreeSet<String>>,
    pub container: RefCell<Option<(String, ContainerState)>>,
    pub builds: RefCell<Vec<BuildRequest>>,
    pub created: RefCell<Vec<ContainerSpec>>,
    /// Image a `load_image` call makes available.
    pub archive_image: RefCell<Option<String>>,
    /// When set, `container_state` fails with this message.
    pub state_error: RefCell<Option<String>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, image: &str) -> Self {
        self.images.borrow_mut().insert(image.to_string());
        self
    }

    pub fn with_container(self, name: &str, state: ContainerState) -> Self {
        *self.container.borrow_mut() = Some((name.to_string(), state));
        self
    }

    pub fn with_state_error(self, msg: &str) -> Self {
        *self.state_error.borrow_mut() = Some(msg.to_string());
        self
    }

    pub fn state(&self) -> ContainerState {
        self.container
            .borrow()
            .as_ref()
            .map(|(_, s)| *s)
            .unwrap_or(ContainerState::Absent)
    }

    pub fn creates(&self) -> usize {
        self.created.borrow().len()
    }
}

impl ContainerRuntime for FakeRuntime {
    fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.images.borrow().contains(image))
    }

    fn container_state(&self, name: &str) -> Result<ContainerState> {
        if let Some(msg) = self.state_error.borrow().as_ref() {
            return Err(anyhow!("{msg}"));
        }
        Ok(match self.container.borrow().as_ref() {
            Some((n, s)) if n == name => *s,
            _ => ContainerState::Absent,
        })
    }

    fn build_image(&self, request: &BuildRequest) -> Result<()> {
        self.builds.borrow_mut().push(request.clone());
        self.images.borrow_mut().insert(request.tag.clone());
        Ok(())
    }

    fn save_image(&self, image: &str, archive: &Path) -> Result<()> {
        if !self.images.borrow().contains(image) {
            return Err(anyhow!("reference does not exist"));
        }
        std::fs::write(archive, format!("fake tar of {image}"))?;
        *self.archive_image.borrow_mut() = Some(image.to_string());
        Ok(())
    }

    fn load_image(&self, archive: &Path) -> Result<()> {
        let text = std::fs::read_to_string(archive)?;
        let image = text
            .strip_prefix("fake tar of ")
            .ok_or_else(|| anyhow!("invalid tar header"))?;
        self.images.borrow_mut().insert(image.to_string());
        Ok(())
    }

    fn remove_image(&self, image: &str) -> Result<()> {
        self.images.borrow_mut().remove(image);
        Ok(())
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<()> {
        if self.container.borrow().is_some() {
            return Err(anyhow!("Conflict. The container name \"/{}\" is already in use", spec.name));
        }
        if !self.images.borrow().contains(&spec.image) {
            return Err(anyhow!("Unable to find image '{}' locally", spec.image));
        }
        for v in spec.volume_names() {
            self.volumes.borrow_mut().insert(v.to_string());
        }
        *self.container.borrow_mut() = Some((spec.name.clone(), ContainerState::Running));
        self.created.borrow_mut().push(spec.clone());
        Ok(())
    }

    fn stop_container(&self, name: &str) -> Result<()> {
        match self.container.borrow_mut().as_mut() {
            Some((n, s)) if n == name => {
                *s = ContainerState::Stopped;
                Ok(())
            }
            _ => Err(anyhow!("No such container: {name}")),
        }
    }

    fn remove_container(&self, name: &str) -> Result<()> {
        let mut c = self.container.borrow_mut();
        if !matches!(c.as_ref(), Some((n, _)) if n == name) {
            return Err(anyhow!("No such container: {name}"));
        }
        *c = None;
        Ok(())
    }

    fn exec_interactive(&self, name: &str, _user: &str, _workdir: &str, _command: &[String]) -> Result<i32> {
        match self.container_state(name)? {
            ContainerState::Running => Ok(0),
            _ => Err(anyhow!("container {name} is not running")),
        }
    }

    fn follow_logs(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn volume_exists(&self, name: &str) -> Result<bool> {
        Ok(self.volumes.borrow().contains(name))
    }

    fn remove_volume(&self, name: &str) -> Result<()> {
        self.volumes.borrow_mut().remove(name);
        Ok(())
    }
}

/// Settings rooted in a temporary project directory, with no settle delay.
pub fn settings_in(dir: &Path) -> Settings {
    let mut s = Settings::defaults(dir, dir);
    s.settle_delay = Duration::ZERO;
    s
}

pub const DOCKERFILE: &str = "FROM ubuntu:22.04\nARG USERNAME=developer\nARG USER_UID=1000\nARG USER_GID=1000\n";

pub fn write_dockerfile(settings: &Settings, text: &str) {
    let parent = settings.build_file.parent().expect("build file has a parent");
    std::fs::create_dir_all(parent).expect("create container dir");
    std::fs::write(&settings.build_file, text).expect("write Dockerfile");
}

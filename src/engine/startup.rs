//! Startup command profiles keyed by image family.
//!
//! The mapping is pure data: classify the image reference, then look up the
//! fixed command vector that brings up an SSH daemon (or keeps the container
//! alive when the family is unknown).

use serde::{Deserialize, Serialize};

/// Families of images that need different bootstrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFamily {
    /// Alpine-based images: install openssh with apk.
    Alpine,
    /// Images that already bundle an SSH daemon.
    SshReady,
    /// Debian or Ubuntu: install openssh with apt.
    Debian,
    /// Anything else: keep the container alive, no SSH.
    Other,
}

const ALPINE_SCRIPT: &str = "apk add --no-cache openssh-server && \
ssh-keygen -A && \
echo 'root:password' | chpasswd && \
sed -i 's/#PermitRootLogin prohibit-password/PermitRootLogin yes/' /etc/ssh/sshd_config && \
sed -i 's/#PasswordAuthentication yes/PasswordAuthentication yes/' /etc/ssh/sshd_config && \
mkdir -p /var/run/sshd && \
/usr/sbin/sshd -D";

const SSH_READY_SCRIPT: &str = "service ssh start && tail -f /dev/null";

const DEBIAN_SCRIPT: &str = "export DEBIAN_FRONTEND=noninteractive && \
apt-get update -qq && \
apt-get install -y -qq openssh-server && \
mkdir -p /var/run/sshd && \
echo 'root:password' | chpasswd && \
sed -i 's/#PermitRootLogin prohibit-password/PermitRootLogin yes/' /etc/ssh/sshd_config && \
sed -i 's/#PasswordAuthentication yes/PasswordAuthentication yes/' /etc/ssh/sshd_config && \
/usr/sbin/sshd -D";

const KEEP_ALIVE_SCRIPT: &str = "tail -f /dev/null";

impl ImageFamily {
    /// Classifies an image reference.
    ///
    /// Order matters: an `ubuntu-sshd` image is `SshReady`, not `Debian`, and
    /// `nginx:alpine` is `Other` because only the repository prefix counts.
    pub fn classify(image: &str) -> Self {
        let image = image.to_lowercase();
        if image.starts_with("alpine") {
            ImageFamily::Alpine
        } else if image.contains("sshd") {
            ImageFamily::SshReady
        } else if image.starts_with("ubuntu") || image.starts_with("debian") {
            ImageFamily::Debian
        } else {
            ImageFamily::Other
        }
    }

    /// The fixed startup command for this family.
    pub fn startup_command(&self) -> Vec<String> {
        let (shell, script) = match self {
            ImageFamily::Alpine => ("/bin/sh", ALPINE_SCRIPT),
            ImageFamily::SshReady => ("/bin/bash", SSH_READY_SCRIPT),
            ImageFamily::Debian => ("/bin/bash", DEBIAN_SCRIPT),
            ImageFamily::Other => ("/bin/sh", KEEP_ALIVE_SCRIPT),
        };
        vec![shell.to_string(), "-c".to_string(), script.to_string()]
    }

    /// Whether containers of this family run an SSH daemon.
    pub fn provides_ssh(&self) -> bool {
        !matches!(self, ImageFamily::Other)
    }
}

/// Shorthand for `ImageFamily::classify(image).startup_command()`.
pub fn startup_command_for(image: &str) -> Vec<String> {
    ImageFamily::classify(image).startup_command()
}

use {
    anyhow::{
        anyhow,
        Result,
    },
    serde::{
        de::DeserializeOwned,
        Serialize,
    },
    std::{
        fs::{
            create_dir_all,
            read_to_string,
            File,
        },
        io::Write,
        path::Path,
    },
};

/// Write `config` to `path` as pretty RON, creating parent directories.
pub fn write_config<C, P>(
    config: &C,
    path: P,
) -> Result<()>
where
    C: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    File::create(path)?.write_all(
        ron::ser::to_string_pretty(
            config,
            ron::ser::PrettyConfig::default(),
        )?.as_bytes()
    )?;
    Ok(())
}

pub fn read_config<C, P>(path: P) -> Result<C>
where
    C: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let text = read_to_string(path)
        .map_err(|e| anyhow!("could not read config {}: {e}", path.display()))?;
    Ok(ron::from_str(&text)?)
}


#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::agents::DDPG_Config,
    };

    #[test]
    fn config_survives_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config_algorithm.ron");

        let mut config = DDPG_Config::tennis();
        config.tau = 0.01;
        config.learn_every = 3;
        write_config(&config, &path).unwrap();

        let restored: DDPG_Config = read_config(&path).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_config::<DDPG_Config, _>(dir.path().join("absent.ron")).is_err());
    }
}

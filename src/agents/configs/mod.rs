mod ddpg;

pub use ddpg::DDPG_Config;

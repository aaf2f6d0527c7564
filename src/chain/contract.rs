//! ABI bindings for the StakeFlow staking contract.
//!
//! Only the read surface the indexer consumes is declared: pool and user
//! structs, the pool counter, APY and pending rewards views, and the four
//! ledger events.

#![allow(missing_docs, missing_debug_implementations, clippy::too_many_arguments)]

alloy::sol! {
    #[sol(rpc)]
    interface IStakeFlowStaking {
        struct Pool {
            address stakingToken;
            address rewardToken;
            uint256 totalStaked;
            uint256 rewardRate;
            uint256 lockDuration;
            uint256 lastUpdateTime;
            uint256 rewardPerTokenStored;
            bool isActive;
            uint256 depositFee;
            uint256 withdrawFee;
        }

        struct UserInfo {
            uint256 stakedAmount;
            uint256 rewardDebt;
            uint256 pendingRewards;
            uint256 lastStakeTime;
            uint256 unlockTime;
        }

        function poolCount() external view returns (uint256);
        function getPool(uint256 _poolId) external view returns (Pool memory);
        function getPoolAPY(uint256 _poolId) external view returns (uint256);
        function getUserInfo(uint256 _poolId, address _user) external view returns (UserInfo memory);
        function pendingRewards(uint256 _poolId, address _user) external view returns (uint256);

        event Staked(address indexed user, uint256 indexed poolId, uint256 amount, uint256 timestamp);
        event Withdrawn(address indexed user, uint256 indexed poolId, uint256 amount, uint256 rewardAmount, uint256 timestamp);
        event RewardClaimed(address indexed user, uint256 indexed poolId, uint256 rewardAmount, uint256 timestamp);
        event EmergencyWithdrawn(address indexed user, uint256 indexed poolId, uint256 amount, uint256 penalty);
    }
}
